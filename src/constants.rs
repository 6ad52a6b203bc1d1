// src/constants.rs
//
// Centralized constants for dicomflow to avoid hardcoded values throughout the codebase

/// Default number of samples per batch
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Transform workers per available CPU when `num_workers` is left on auto.
/// Transforms are mostly file I/O, so the window runs well ahead of the core count.
pub const WORKERS_PER_CPU: usize = 5;

// ============================================================================
// Environment variables
// ============================================================================

pub const ENV_BATCH_SIZE: &str = "DICOMFLOW_BATCH_SIZE";
pub const ENV_WORKERS: &str = "DICOMFLOW_WORKERS";
pub const ENV_SEED: &str = "DICOMFLOW_SEED";
/// humantime duration, e.g. `30s` or `2m`
pub const ENV_TIMEOUT: &str = "DICOMFLOW_TIMEOUT";
pub const ENV_DATA_DIR: &str = "DICOMFLOW_DATA_DIR";

// ============================================================================
// Data directory layout
// ============================================================================

/// CSV mapping DICOM series directories to contour directories
pub const LINK_FILE: &str = "link.csv";
pub const DICOMS_DIR: &str = "dicoms";
pub const CONTOURS_DIR: &str = "contourfiles";
pub const I_CONTOURS_DIR: &str = "i-contours";
pub const O_CONTOURS_DIR: &str = "o-contours";

/// Width the slice index is zero-padded to in contour file names
pub const CONTOUR_INDEX_WIDTH: usize = 4;

// ============================================================================
// DICOM
// ============================================================================

/// Length of the Part-10 preamble preceding the `DICM` magic
pub const DICOM_PREAMBLE_LEN: usize = 128;
pub const DICOM_MAGIC: &[u8; 4] = b"DICM";

pub const TRANSFER_SYNTAX_IMPLICIT_LE: &str = "1.2.840.10008.1.2";
pub const TRANSFER_SYNTAX_EXPLICIT_LE: &str = "1.2.840.10008.1.2.1";
