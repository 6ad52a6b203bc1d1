// src/data_loader/ordered_map.rs
//
// Order-preserving parallel map with a bounded window of in-flight transforms.

//! The mapper keeps a FIFO window of at most `W` task handles.
//!
//! 1. The window is primed with the first `W` items.
//! 2. For every further item the oldest handle is awaited and retired, the
//!    new item is submitted at the tail, and the retired outcome is yielded.
//! 3. Once the input is exhausted the window is drained in submission order.
//!
//! Outcomes are retired strictly from the head, so output order equals input
//! order no matter which worker finishes first.  A new task is submitted only
//! after one is retired, and only while the consumer is polling, so a slow
//! consumer stalls submissions.

use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::data_loader::dataset::{DatasetError, DynStream};
use crate::data_loader::pool::{TaskHandle, WorkerPool};
use crate::data_loader::transform::Transform;

type Outcome<O> = anyhow::Result<Option<O>>;

/// In-flight tasks in submission order. Owns the pool it submits to; dropping
/// the window aborts whatever has not started and closes the pool.
struct Window<O> {
    pool: WorkerPool,
    pending: VecDeque<TaskHandle<Outcome<O>>>,
}

impl<O: Send + 'static> Window<O> {
    fn new(pool: WorkerPool) -> Self {
        let pending = VecDeque::with_capacity(pool.size());
        Self { pool, pending }
    }

    fn is_full(&self) -> bool {
        self.pending.len() >= self.pool.size()
    }

    fn submit<I, T>(&mut self, transform: &Arc<T>, position: usize, item: I)
    where
        I: Send + 'static,
        T: Transform<I, Output = O>,
    {
        let transform = Arc::clone(transform);
        let handle = self.pool.submit(position, move || transform.apply(item));
        self.pending.push_back(handle);
    }

    /// Wait for the oldest task and remove it, or `None` if nothing is pending.
    async fn retire_oldest(&mut self) -> Option<Result<Option<O>, DatasetError>> {
        let head = self.pending.front_mut()?;
        let position = head.position();
        let joined = head.wait().await;
        self.pending.pop_front();
        trace!("retired item {}", position);

        Some(joined.and_then(|outcome| {
            outcome.map_err(|source| DatasetError::Transform { position, source })
        }))
    }
}

impl<O> Drop for Window<O> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "releasing worker pool with {} tasks still pending",
                self.pending.len()
            );
        }
        self.pending.clear();
        self.pool.close();
    }
}

fn is_cancelled(token: &Option<CancellationToken>) -> bool {
    token.as_ref().is_some_and(|t| t.is_cancelled())
}

/// Map `input` through `transform` on `pool`, yielding outcomes in input order.
///
/// At most `pool.size()` transforms execute at any instant.  The first
/// transform error is yielded at its position and ends the stream; once the
/// returned stream is dropped the pool is closed and pending work abandoned.
/// When `cancel` fires, nothing further is submitted and the stream ends.
pub fn ordered_map<St, I, T>(
    input: St,
    transform: Arc<T>,
    pool: WorkerPool,
    cancel: Option<CancellationToken>,
) -> DynStream<Option<T::Output>>
where
    St: Stream<Item = I> + Send + 'static,
    I: Send + 'static,
    T: Transform<I>,
{
    Box::pin(try_stream! {
        let mut input = Box::pin(input.fuse());
        let mut window = Window::new(pool);
        let mut submitted = 0usize;

        while !window.is_full() {
            if is_cancelled(&cancel) {
                debug!("cancelled while priming the window");
                return;
            }
            match input.next().await {
                Some(item) => {
                    window.submit(&transform, submitted, item);
                    submitted += 1;
                }
                None => break,
            }
        }
        debug!("window primed with {} tasks", submitted);

        while let Some(item) = input.next().await {
            if is_cancelled(&cancel) {
                debug!("cancelled after {} submissions", submitted);
                return;
            }
            // A faulted head ends the stream before anything else is submitted.
            let outcome = match window.retire_oldest().await {
                Some(retired) => Some(retired?),
                None => None,
            };
            window.submit(&transform, submitted, item);
            submitted += 1;
            if let Some(outcome) = outcome {
                yield outcome;
            }
        }

        while let Some(retired) = window.retire_oldest().await {
            if is_cancelled(&cancel) {
                debug!("cancelled while draining the window");
                return;
            }
            let outcome = retired?;
            yield outcome;
        }
        debug!("mapped {} items", submitted);
    })
}
