// src/data_loader/options.rs
//!
//! Options for the epoch pipeline.
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = LoaderOptions::default()
//!     .with_batch_size(8)
//!     .num_workers(16)
//!     .with_seed(42)
//!     .with_timeout(30.0);
//!
//! `num_workers == 0` means "auto": the affinity-aware CPU count times
//! [`WORKERS_PER_CPU`].  The value is resolved when an epoch starts, never
//! read from a process-wide default.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::constants::{
    DEFAULT_BATCH_SIZE, ENV_BATCH_SIZE, ENV_SEED, ENV_TIMEOUT, ENV_WORKERS, WORKERS_PER_CPU,
};
use crate::data_loader::dataset::DatasetError;
use crate::hardware;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Window size W: transforms allowed in flight at once. `0` means "auto".
    pub num_workers: usize,
    /// Base seed for epoch shuffles. `None` draws one per dataloader.
    pub seed: Option<u64>,
    /// Per-transform timeout in seconds (None = no timeout).
    pub timeout_seconds: Option<f64>,
    /// Stops submitting new transforms once cancelled.
    pub cancellation_token: Option<CancellationToken>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: 0,
            seed: None,
            timeout_seconds: None,
            cancellation_token: None,
        }
    }
}

impl LoaderOptions {
    /// Builder-style helper: change the batch size.
    ///
    /// Zero is kept as-is and rejected when the epoch starts.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the window size. `0` means "auto".
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    /// Fix the base shuffle seed for reproducible epochs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set per-transform timeout in seconds (None = no timeout)
    pub fn timeout_seconds(mut self, timeout: Option<f64>) -> Self {
        self.timeout_seconds = timeout;
        self
    }

    /// Set timeout in seconds (convenience method)
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Attach a cancellation token checked before every submission.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Concrete window size after resolving "auto".
    pub fn resolved_workers(&self) -> usize {
        if self.num_workers == 0 {
            default_worker_count()
        } else {
            self.num_workers
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Reject a zero batch size before any work is submitted.
    ///
    /// Worker counts need no check here: `num_workers == 0` resolves to the
    /// hardware default (always at least one), and [`WorkerPool::new`]
    /// rejects an explicit zero.
    ///
    /// [`WorkerPool::new`]: crate::data_loader::WorkerPool::new
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.batch_size < 1 {
            return Err(DatasetError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }

    /// Defaults overridden by `DICOMFLOW_*` environment variables.
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Some(n) = env_parse::<usize>(ENV_BATCH_SIZE) {
            opts.batch_size = n;
        }
        if let Some(n) = env_parse::<usize>(ENV_WORKERS) {
            opts.num_workers = n;
        }
        if let Some(seed) = env_parse::<u64>(ENV_SEED) {
            opts.seed = Some(seed);
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT) {
            match humantime::parse_duration(raw.trim()) {
                Ok(d) => opts.timeout_seconds = Some(d.as_secs_f64()),
                Err(e) => tracing::warn!("ignoring {}={:?}: {}", ENV_TIMEOUT, raw, e),
            }
        }
        opts
    }
}

/// Hardware-derived default for the window size.
pub fn default_worker_count() -> usize {
    hardware::get_affinity_cpu_count().max(1) * WORKERS_PER_CPU
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = LoaderOptions::default();
        assert_eq!(o.batch_size, 8);
        assert_eq!(o.num_workers, 0);
        assert!(o.resolved_workers() >= WORKERS_PER_CPU);
        assert!(o.timeout().is_none());
        assert!(o.validate().is_ok());
    }

    #[test]
    fn zero_batch_is_rejected() {
        let err = LoaderOptions::default().with_batch_size(0).validate().unwrap_err();
        assert!(matches!(err, DatasetError::InvalidBatchSize(0)));
    }

    #[test]
    fn auto_workers_pass_validation() {
        let o = LoaderOptions::default().num_workers(0);
        assert!(o.resolved_workers() >= 1);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn explicit_workers_win_over_auto() {
        let o = LoaderOptions::default().num_workers(3);
        assert_eq!(o.resolved_workers(), 3);
    }

    #[test]
    fn timeout_ignores_non_positive() {
        assert!(LoaderOptions::default().with_timeout(0.0).timeout().is_none());
        assert_eq!(
            LoaderOptions::default().with_timeout(1.5).timeout(),
            Some(Duration::from_millis(1500))
        );
    }
}
