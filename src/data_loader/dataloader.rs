//! Epoch driver.
//!
//! * Owns a [`Dataset`] plus the transform and collate collaborators.
//! * Each [`DataLoader::train_epoch`] call shuffles a copy of the items and
//!   wires them through the ordered mapper, the absence filter and the batcher.
//! * Yields `Result<C::Batch, DatasetError>`; the first error ends the epoch.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream;
use futures_core::stream::Stream;
use rand::Rng;
use tracing::info;

use crate::data_loader::batch::{batched, Collate};
use crate::data_loader::dataset::{Dataset, DatasetError, DynStream};
use crate::data_loader::options::LoaderOptions;
use crate::data_loader::ordered_map::ordered_map;
use crate::data_loader::pool::WorkerPool;
use crate::data_loader::sampler::{SequentialSampler, ShuffleSampler};
use crate::data_loader::transform::{samples, Transform};

/// High‑level driver that produces batched epochs from a dataset.
pub struct DataLoader<I, T, C> {
    dataset: Dataset<I>,
    transform: Arc<T>,
    collate: Arc<C>,
    opts: LoaderOptions,
    base_seed: u64,
    epochs: AtomicU64,
}

impl<I, T, C> DataLoader<I, T, C>
where
    I: Clone + Send + Sync + 'static,
    T: Transform<I>,
    C: Collate<T::Output>,
{
    /// Create a new loader. Without a configured seed, one is drawn now and
    /// reused (offset by the epoch index) for every epoch.
    pub fn new(dataset: Dataset<I>, transform: T, collate: C, opts: LoaderOptions) -> Self {
        let base_seed = opts.seed.unwrap_or_else(|| rand::rng().random());
        Self {
            dataset,
            transform: Arc::new(transform),
            collate: Arc::new(collate),
            opts,
            base_seed,
            epochs: AtomicU64::new(0),
        }
    }

    pub fn dataset(&self) -> &Dataset<I> {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.opts
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Number of epochs started so far.
    pub fn epochs_started(&self) -> u64 {
        self.epochs.load(Ordering::Relaxed)
    }

    /// Start one epoch with the configured batch size.
    pub fn stream(&self) -> Result<Epoch<C::Batch>, DatasetError> {
        self.train_epoch(self.opts.batch_size)
    }

    /// Start one shuffled epoch yielding batches of exactly `batch_size`.
    ///
    /// Invalid batch or worker counts are rejected here, before any transform
    /// is submitted.  Epochs are independent; several may run at once.
    ///
    /// ```ignore
    /// let mut epoch = loader.train_epoch(8)?;
    /// while let Some(batch) = epoch.next().await {
    ///     let batch = batch?;
    ///     // training step ...
    /// }
    /// ```
    pub fn train_epoch(&self, batch_size: usize) -> Result<Epoch<C::Batch>, DatasetError> {
        let opts = self.opts.clone().with_batch_size(batch_size);
        opts.validate()?;
        let pool = WorkerPool::new(opts.resolved_workers())?.with_timeout(opts.timeout());

        let index = self.epochs.fetch_add(1, Ordering::Relaxed);
        let seed = self.base_seed.wrapping_add(index);
        let items = self
            .dataset
            .reordered(ShuffleSampler::new(self.dataset.len(), seed));

        info!(
            "epoch {} (seed {}): {} items, batch size {}, {} workers",
            index,
            seed,
            items.len(),
            batch_size,
            pool.size()
        );

        let outcomes = ordered_map(
            stream::iter(items),
            Arc::clone(&self.transform),
            pool,
            opts.cancellation_token.clone(),
        );
        let inner = batched(samples(outcomes), batch_size, Arc::clone(&self.collate))?;

        Ok(Epoch { index, seed, inner })
    }

    /// Map every item in dataset order, keeping absent outcomes.
    ///
    /// Nothing is shuffled, filtered or batched, so the batch size is
    /// ignored; useful for checking the transform over a whole dataset.
    pub fn map_in_order(&self) -> Result<DynStream<Option<T::Output>>, DatasetError> {
        let pool = WorkerPool::new(self.opts.resolved_workers())?.with_timeout(self.opts.timeout());
        let items = self
            .dataset
            .reordered(SequentialSampler::new(self.dataset.len()));

        Ok(ordered_map(
            stream::iter(items),
            Arc::clone(&self.transform),
            pool,
            self.opts.cancellation_token.clone(),
        ))
    }
}

impl<I, T, C> std::fmt::Debug for DataLoader<I, T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("items", &self.dataset.len())
            .field("batch_size", &self.opts.batch_size)
            .field("num_workers", &self.opts.num_workers)
            .field("base_seed", &self.base_seed)
            .finish()
    }
}

/// One live pass over the dataset: a stream of batches.
///
/// Dropping it before the end releases the epoch's worker pool.
pub struct Epoch<B> {
    index: u64,
    seed: u64,
    inner: DynStream<B>,
}

impl<B> Epoch<B> {
    /// Zero-based epoch number within its loader.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Seed of this epoch's shuffle.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl<B> Stream for Epoch<B> {
    type Item = Result<B, DatasetError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl<B> std::fmt::Debug for Epoch<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Epoch")
            .field("index", &self.index)
            .field("seed", &self.seed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::batch::VecCollate;

    #[test]
    fn debug_reports_size_and_options() {
        let loader = DataLoader::new(
            Dataset::new(vec![1u32, 2, 3]),
            |x: u32| -> anyhow::Result<Option<u32>> { Ok(Some(x)) },
            VecCollate,
            LoaderOptions::default().num_workers(2).with_seed(9),
        );
        let shown = format!("{loader:?}");
        assert!(shown.starts_with("DataLoader"), "{shown}");
        assert!(shown.contains("items: 3"), "{shown}");
        assert!(shown.contains("num_workers: 2"), "{shown}");
        assert!(shown.contains("base_seed: 9"), "{shown}");
    }
}
