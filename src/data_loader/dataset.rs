//! Core dataset abstractions for dicomflow's training data-loader.
//!
//! A [`Dataset`] owns the full, immutable collection of items an epoch is
//! drawn from.  Items are assembled exactly once, at construction, by an
//! [`ItemSource`]; every epoch afterwards works on its own shuffled copy.

use anyhow::{self, Error as AnyError};
use futures_core::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A boxed, pinned, sendable async stream of fallible items.
pub type DynStream<T> =
    Pin<Box<dyn Stream<Item = Result<T, DatasetError>> + Send + 'static>>;

/// Error type for dataset, pipeline and loader operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("batch size must be at least 1 (got {0})")]
    InvalidBatchSize(usize),

    #[error("transform failed for item at position {position}: {source}")]
    Transform {
        position: usize,
        #[source]
        source: AnyError,
    },

    #[error("transform panicked for item at position {position}")]
    WorkerPanicked { position: usize },

    #[error("transform for item at position {position} timed out after {after:?}")]
    Timeout { position: usize, after: Duration },

    #[error("batch assembly failed: {0}")]
    Collate(#[source] AnyError),

    #[error("worker pool closed before the task could start")]
    PoolClosed,

    #[error(transparent)]
    Backend(#[from] AnyError),
}

impl DatasetError {
    /// Position (within the epoch's input order) of the item that faulted,
    /// if this error is tied to one.
    pub fn position(&self) -> Option<usize> {
        match self {
            DatasetError::Transform { position, .. }
            | DatasetError::WorkerPanicked { position }
            | DatasetError::Timeout { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Configuration faults are raised before any work is submitted.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            DatasetError::InvalidWorkerCount(_) | DatasetError::InvalidBatchSize(_)
        )
    }
}

impl From<String> for DatasetError {
    fn from(s: String) -> Self {
        DatasetError::Backend(AnyError::msg(s))
    }
}

impl From<&str> for DatasetError {
    fn from(s: &str) -> Self {
        DatasetError::Backend(AnyError::msg(s.to_string()))
    }
}

/// Produces the full ordered item collection a [`Dataset`] is built from.
///
/// Implementors may walk a directory tree, read an index file, etc.  The
/// result must be finite; it is materialized once.
pub trait ItemSource {
    type Item: Clone + Send + Sync + 'static;

    fn assemble(&self) -> anyhow::Result<Vec<Self::Item>>;
}

/// The immutable, shareable item collection behind every epoch.
#[derive(Debug)]
pub struct Dataset<I> {
    items: Arc<[I]>,
}

impl<I> Clone for Dataset<I> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<I> Dataset<I> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in their original (construction) order.
    pub fn items(&self) -> &[I] {
        &self.items
    }
}

impl<I> Dataset<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Assemble the items from `source` and take ownership of them.
    pub fn from_source<S>(source: &S) -> anyhow::Result<Self>
    where
        S: ItemSource<Item = I>,
    {
        let items = source.assemble()?;
        tracing::info!("assembled dataset with {} items", items.len());
        Ok(Self::new(items))
    }

    /// Copy of the items in the order given by `order` (indices into
    /// [`Dataset::items`]).
    pub(crate) fn reordered(&self, order: impl IntoIterator<Item = usize>) -> Vec<I> {
        order
            .into_iter()
            .map(|idx| self.items[idx].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u32>);

    impl ItemSource for Fixed {
        type Item = u32;

        fn assemble(&self) -> anyhow::Result<Vec<u32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn from_source_keeps_order() {
        let ds = Dataset::from_source(&Fixed(vec![3, 1, 2])).unwrap();
        assert_eq!(ds.items(), &[3, 1, 2]);
        assert_eq!(ds.len(), 3);
        assert!(!ds.is_empty());
    }

    #[test]
    fn reordered_copies_without_touching_original() {
        let ds = Dataset::new(vec!['a', 'b', 'c']);
        assert_eq!(ds.reordered([2, 0, 1]), vec!['c', 'a', 'b']);
        assert_eq!(ds.items(), &['a', 'b', 'c']);
    }

    #[test]
    fn error_positions() {
        let e = DatasetError::WorkerPanicked { position: 7 };
        assert_eq!(e.position(), Some(7));
        assert!(!e.is_config());
        assert!(DatasetError::InvalidBatchSize(0).is_config());
        assert_eq!(DatasetError::from("boom").position(), None);
    }
}
