// src/data_loader/pool.rs
//
// Fixed-size pool of blocking transform workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::data_loader::dataset::DatasetError;

/// A pool that never runs more than `size` jobs at once.
///
/// Jobs run on tokio's blocking threads.  Each job holds one of `size`
/// permits for as long as it executes, including after its handle was
/// aborted or timed out, so the bound holds even for detached work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, DatasetError> {
        if size < 1 {
            return Err(DatasetError::InvalidWorkerCount(size));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            timeout: None,
        })
    }

    /// Fail a job's handle with [`DatasetError::Timeout`] if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    /// Stop granting permits. Jobs that have not started yet fail with
    /// [`DatasetError::PoolClosed`]; running jobs finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Run `job` on the pool. `position` tags any error the handle reports.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, R>(&self, position: usize, job: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;

        let inner = tokio::spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| DatasetError::PoolClosed)?;

            let work = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            });

            let joined = match timeout {
                Some(after) => tokio::time::timeout(after, work)
                    .await
                    .map_err(|_| DatasetError::Timeout { position, after })?,
                None => work.await,
            };
            joined.map_err(|e| join_error(position, e))
        });

        TaskHandle { position, inner }
    }
}

/// Handle to one submitted job. Dropping it aborts the job if it has not
/// started; a job already running on a blocking thread is detached.
#[derive(Debug)]
pub struct TaskHandle<R> {
    position: usize,
    inner: JoinHandle<Result<R, DatasetError>>,
}

impl<R> TaskHandle<R> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the job.  Must not be called again once it has returned.
    pub(crate) async fn wait(&mut self) -> Result<R, DatasetError> {
        match (&mut self.inner).await {
            Ok(res) => res,
            Err(e) => Err(join_error(self.position, e)),
        }
    }

    pub async fn join(mut self) -> Result<R, DatasetError> {
        self.wait().await
    }
}

impl<R> Drop for TaskHandle<R> {
    fn drop(&mut self) {
        self.inner.abort();
    }
}

fn join_error(position: usize, e: JoinError) -> DatasetError {
    if e.is_panic() {
        DatasetError::WorkerPanicked { position }
    } else {
        DatasetError::PoolClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(DatasetError::InvalidWorkerCount(0))
        ));
    }

    #[tokio::test]
    async fn runs_job_and_returns_value() {
        let pool = WorkerPool::new(2).unwrap();
        let out = pool.submit(0, || 21 * 2).join().await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn panic_becomes_worker_panicked() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool
            .submit(3, || -> u32 { panic!("decode blew up") })
            .join()
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::WorkerPanicked { position: 3 }));
    }

    #[tokio::test]
    async fn closed_pool_refuses_new_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        pool.close();
        assert!(pool.is_closed());
        let err = pool.submit(0, || 1).join().await.unwrap_err();
        assert!(matches!(err, DatasetError::PoolClosed));
    }

    #[tokio::test]
    async fn permits_bound_concurrency() {
        let pool = WorkerPool::new(2).unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                pool.submit(i, move || {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    live.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().await.unwrap(), i);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn timeout_reports_position() {
        let pool = WorkerPool::new(1)
            .unwrap()
            .with_timeout(Some(Duration::from_millis(10)));
        let err = pool
            .submit(5, || std::thread::sleep(Duration::from_millis(200)))
            .join()
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Timeout { position: 5, .. }));
    }
}
