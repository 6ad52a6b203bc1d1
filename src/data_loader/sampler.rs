//! src/data_loader/sampler.rs
//! Index samplers for the epoch driver.
//!
//! A `Sampler` produces the order in which dataset items enter an epoch.
//! `SequentialSampler` keeps dataset order; `ShuffleSampler` draws a uniform
//! random permutation, deterministic for a given seed.

use std::ops::Range;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Produces the order in which an epoch visits dataset indices.
pub trait Sampler {
    fn next_index(&mut self) -> Option<usize>;

    /// Indices not yet produced.
    fn remaining(&self) -> usize;
}

/// Dataset order, used when mapping without shuffling.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    range: Range<usize>,
}

impl SequentialSampler {
    pub fn new(len: usize) -> Self {
        Self { range: 0..len }
    }
}

impl Sampler for SequentialSampler {
    fn next_index(&mut self) -> Option<usize> {
        self.range.next()
    }

    fn remaining(&self) -> usize {
        self.range.len()
    }
}

impl Iterator for SequentialSampler {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.next_index()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

/// Yields all indices `0..len` in a shuffled order.
///
/// Every permutation is equally likely: the shuffle is an unbiased
/// Fisher–Yates driven by a ChaCha20 stream seeded from `seed`.
#[derive(Debug, Clone)]
pub struct ShuffleSampler {
    indices: Vec<usize>,
    pos: usize,
}

impl ShuffleSampler {
    /// Create a shuffled sampler for `len` items, using `seed`.
    pub fn new(len: usize, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        Self { indices, pos: 0 }
    }
}

impl Sampler for ShuffleSampler {
    fn next_index(&mut self) -> Option<usize> {
        let i = *self.indices.get(self.pos)?;
        self.pos += 1;
        Some(i)
    }

    fn remaining(&self) -> usize {
        self.indices.len() - self.pos
    }
}

impl Iterator for ShuffleSampler {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.next_index()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}
