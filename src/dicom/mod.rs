// src/dicom/mod.rs

//! Cardiac MRI slices with manual contour annotations.
//!
//! `assemble` pairs slices with contour files, `sample` turns one pair into
//! an image/mask sample and stacks samples into batches.

pub mod assemble;
pub mod contour;
pub mod parser;
pub mod sample;

pub use assemble::{contour_file_name, parse_links, ContourKind, DicomDirectory, Link};
pub use contour::{parse_contour, parse_contour_file, poly_to_mask};
pub use parser::{parse_dicom, read_dicom, DicomError, DicomImage};
pub use sample::{ContourBatch, ContourCollate, ContourSample, ContourSampler, DicomDatum};
