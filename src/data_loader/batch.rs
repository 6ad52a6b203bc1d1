// src/data_loader/batch.rs
//
// Fixed-size batching of an ordered sample stream.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::data_loader::dataset::{DatasetError, DynStream};

/// Assembles one chunk of exactly `batch_size` samples into a batch.
///
/// Implementations may assume every sample in a chunk has the same fields
/// and per-field shape; they should return an error rather than panic when
/// that does not hold.
pub trait Collate<S>: Send + Sync + 'static {
    type Batch: Send + 'static;

    fn collate(&self, samples: Vec<S>) -> anyhow::Result<Self::Batch>;
}

impl<S, B, F> Collate<S> for F
where
    F: Fn(Vec<S>) -> anyhow::Result<B> + Send + Sync + 'static,
    B: Send + 'static,
{
    type Batch = B;

    fn collate(&self, samples: Vec<S>) -> anyhow::Result<B> {
        self(samples)
    }
}

/// Leaves each chunk as a plain `Vec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VecCollate;

impl<S: Send + 'static> Collate<S> for VecCollate {
    type Batch = Vec<S>;

    fn collate(&self, samples: Vec<S>) -> anyhow::Result<Vec<S>> {
        Ok(samples)
    }
}

/// Group `input` into batches of exactly `batch_size` samples.
///
/// A trailing chunk shorter than `batch_size` is dropped, never padded, so
/// every batch has the same shape.  Errors from `input` or from `collate`
/// are yielded once and end the stream.
pub fn batched<S, C>(
    input: DynStream<S>,
    batch_size: usize,
    collate: Arc<C>,
) -> Result<DynStream<C::Batch>, DatasetError>
where
    S: Send + 'static,
    C: Collate<S>,
{
    if batch_size < 1 {
        return Err(DatasetError::InvalidBatchSize(batch_size));
    }

    Ok(Box::pin(try_stream! {
        let mut input = input;
        let mut acc = Vec::with_capacity(batch_size);
        let mut emitted = 0usize;

        while let Some(sample) = input.next().await {
            acc.push(sample?);
            if acc.len() == batch_size {
                let chunk = std::mem::replace(&mut acc, Vec::with_capacity(batch_size));
                let batch = collate.collate(chunk).map_err(DatasetError::Collate)?;
                emitted += 1;
                yield batch;
            }
        }

        if !acc.is_empty() {
            tracing::debug!(
                "dropping {} trailing samples after {} full batches",
                acc.len(),
                emitted
            );
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn numbers(n: usize) -> DynStream<usize> {
        Box::pin(stream::iter((0..n).map(Ok)))
    }

    #[tokio::test]
    async fn batch_count_is_floor() {
        for (len, size) in [(10, 4), (12, 4), (3, 4), (0, 1), (7, 1), (1140, 8)] {
            let out: Vec<Vec<usize>> = batched(numbers(len), size, Arc::new(VecCollate))
                .unwrap()
                .map(Result::unwrap)
                .collect()
                .await;
            assert_eq!(out.len(), len / size, "len={len} size={size}");
            assert!(out.iter().all(|b| b.len() == size));
            let flat: Vec<usize> = out.into_iter().flatten().collect();
            assert_eq!(flat, (0..(len / size) * size).collect::<Vec<_>>());
        }
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = batched(numbers(3), 0, Arc::new(VecCollate)).err().unwrap();
        assert!(matches!(err, DatasetError::InvalidBatchSize(0)));
    }

    #[tokio::test]
    async fn collate_error_ends_stream() {
        let collate = |chunk: Vec<usize>| -> anyhow::Result<usize> {
            if chunk[0] >= 4 {
                anyhow::bail!("ragged chunk starting at {}", chunk[0]);
            }
            Ok(chunk.iter().sum())
        };
        let out: Vec<_> = batched(numbers(12), 2, Arc::new(collate))
            .unwrap()
            .collect()
            .await;
        assert_eq!(out.len(), 3);
        assert_eq!(*out[0].as_ref().unwrap(), 1);
        assert_eq!(*out[1].as_ref().unwrap(), 5);
        assert!(matches!(out[2], Err(DatasetError::Collate(_))));
    }
}
