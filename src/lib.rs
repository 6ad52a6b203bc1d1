// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: public re-exports for the loader pipeline and the DICOM dataset.

pub mod constants;
pub mod hardware;
pub mod data_loader;
pub mod dicom;

pub use data_loader::{
    batched, ordered_map, samples, Collate, DataLoader, Dataset, DatasetError, DynStream, Epoch,
    ItemSource, LoaderOptions, Transform, VecCollate, WorkerPool,
};
pub use dicom::{
    ContourBatch, ContourCollate, ContourSample, ContourSampler, DicomDatum, DicomDirectory,
    DicomError,
};

/// The loader wired for a contour data root.
pub type DicomLoader = DataLoader<DicomDatum, ContourSampler, ContourCollate>;

/// Assemble the data root at `root` and build a loader over it.
pub fn dicom_loader(
    root: impl Into<std::path::PathBuf>,
    opts: LoaderOptions,
) -> anyhow::Result<DicomLoader> {
    let root = root.into();
    let dataset = Dataset::from_source(&DicomDirectory::new(root.clone()))?;
    Ok(DataLoader::new(
        dataset,
        ContourSampler::new(root),
        ContourCollate,
        opts,
    ))
}
