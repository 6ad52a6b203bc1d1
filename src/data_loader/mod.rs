// src/data_loader/mod.rs

//! Public API surface for the dicomflow data_loader layer.
//!
//! Items flow `Dataset -> ordered_map -> samples -> batched`, one lazy stream
//! per epoch.

pub mod batch;
pub mod dataloader;
pub mod dataset;
pub mod options;
pub mod ordered_map;
pub mod pool;
pub mod sampler;
pub mod transform;

// Re‐export the key types at this level:
pub use batch::{batched, Collate, VecCollate};
pub use dataloader::{DataLoader, Epoch};
pub use dataset::{Dataset, DatasetError, DynStream, ItemSource};
pub use options::{default_worker_count, LoaderOptions};
pub use ordered_map::ordered_map;
pub use pool::{TaskHandle, WorkerPool};
pub use sampler::{Sampler, SequentialSampler, ShuffleSampler};
pub use transform::{samples, Transform};
