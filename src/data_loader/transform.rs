//! Per-item transform contract and the filter that drops absent outcomes.
//!
//! A transform turns one item into `Some(sample)`, or `None` when the item
//! has no usable data.  `None` is not an error: [`samples`] removes it from
//! the stream.  A genuine failure is an `Err` and ends the epoch.

use futures::TryStreamExt;

use crate::data_loader::dataset::DynStream;

/// Transform applied to every item on the worker pool.
///
/// Invoked concurrently from several workers on different items, so
/// implementations must not share mutable state between calls.
pub trait Transform<I>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn apply(&self, item: I) -> anyhow::Result<Option<Self::Output>>;
}

impl<I, O, F> Transform<I> for F
where
    F: Fn(I) -> anyhow::Result<Option<O>> + Send + Sync + 'static,
    O: Send + 'static,
{
    type Output = O;

    fn apply(&self, item: I) -> anyhow::Result<Option<O>> {
        self(item)
    }
}

/// Forward only present outcomes, in order.
pub fn samples<S>(outcomes: DynStream<Option<S>>) -> DynStream<S>
where
    S: Send + 'static,
{
    Box::pin(outcomes.try_filter_map(|outcome| async move {
        if outcome.is_none() {
            tracing::trace!("dropping item with no usable sample");
        }
        Ok(outcome)
    }))
}
