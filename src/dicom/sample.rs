// src/dicom/sample.rs
//
// Turns one DicomDatum into a training sample, and stacks samples into batches.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array2, Array3, Array4, Axis};
use tracing::debug;

use crate::constants::{CONTOURS_DIR, DICOMS_DIR};
use crate::data_loader::batch::Collate;
use crate::data_loader::transform::Transform;
use crate::dicom::contour::{parse_contour_file, poly_to_mask};
use crate::dicom::parser::read_dicom;

/// One DICOM slice and its optional annotations, as paths relative to the
/// `dicoms/` and `contourfiles/` directories of a data root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DicomDatum {
    pub dicom: String,
    pub i_contour: Option<String>,
    pub o_contour: Option<String>,
}

impl DicomDatum {
    pub fn dicom_path(&self, root: &Path) -> PathBuf {
        root.join(DICOMS_DIR).join(&self.dicom)
    }

    pub fn i_contour_path(&self, root: &Path) -> Option<PathBuf> {
        self.i_contour.as_ref().map(|c| root.join(CONTOURS_DIR).join(c))
    }

    pub fn o_contour_path(&self, root: &Path) -> Option<PathBuf> {
        self.o_contour.as_ref().map(|c| root.join(CONTOURS_DIR).join(c))
    }
}

/// `image` is `(H, W, 1)`; `target` is `(H, W, 2)` with the inner contour
/// mask in channel 0 and the outer in channel 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourSample {
    pub image: Array3<i16>,
    pub target: Array3<bool>,
}

/// Samples stacked along a new leading batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourBatch {
    pub images: Array4<i16>,
    pub targets: Array4<bool>,
}

impl ContourBatch {
    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads and rasterizes datums relative to a data root.
#[derive(Debug, Clone)]
pub struct ContourSampler {
    root: PathBuf,
}

impl ContourSampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Ok(None)` when the slice file is not DICOM; any other failure is an error.
    pub fn sample(&self, datum: &DicomDatum) -> Result<Option<ContourSample>> {
        let path = datum.dicom_path(&self.root);
        let image = match read_dicom(&path)
            .with_context(|| format!("decoding {}", path.display()))?
        {
            Some(image) => image.pixels,
            None => {
                debug!("{} is not a DICOM file, skipping", path.display());
                return Ok(None);
            }
        };

        let (rows, cols) = image.dim();
        let inner = contour_mask(datum.i_contour_path(&self.root), rows, cols)?;
        let outer = contour_mask(datum.o_contour_path(&self.root), rows, cols)?;

        let target = ndarray::stack(Axis(2), &[inner.view(), outer.view()])
            .context("stacking contour masks")?;
        Ok(Some(ContourSample {
            image: image.insert_axis(Axis(2)),
            target,
        }))
    }
}

fn contour_mask(path: Option<PathBuf>, rows: usize, cols: usize) -> Result<Array2<bool>> {
    match path {
        Some(path) => {
            let polygon = parse_contour_file(&path)?;
            Ok(poly_to_mask(&polygon, cols, rows))
        }
        None => Ok(Array2::from_elem((rows, cols), false)),
    }
}

impl Transform<DicomDatum> for ContourSampler {
    type Output = ContourSample;

    fn apply(&self, item: DicomDatum) -> Result<Option<ContourSample>> {
        self.sample(&item)
    }
}

/// Stacks every field of a chunk into one array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourCollate;

impl Collate<ContourSample> for ContourCollate {
    type Batch = ContourBatch;

    fn collate(&self, samples: Vec<ContourSample>) -> Result<ContourBatch> {
        let images: Vec<_> = samples.iter().map(|s| s.image.view()).collect();
        let targets: Vec<_> = samples.iter().map(|s| s.target.view()).collect();
        Ok(ContourBatch {
            images: ndarray::stack(Axis(0), &images).context("stacking images")?,
            targets: ndarray::stack(Axis(0), &targets).context("stacking targets")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(h: usize, w: usize, fill: i16) -> ContourSample {
        ContourSample {
            image: Array3::from_elem((h, w, 1), fill),
            target: Array3::from_elem((h, w, 2), fill % 2 == 0),
        }
    }

    #[test]
    fn collate_adds_leading_axis() {
        let batch = ContourCollate
            .collate(vec![sample(4, 5, 1), sample(4, 5, 2), sample(4, 5, 3)])
            .unwrap();
        assert_eq!(batch.images.dim(), (3, 4, 5, 1));
        assert_eq!(batch.targets.dim(), (3, 4, 5, 2));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.images[[1, 0, 0, 0]], 2);
        assert!(batch.targets[[1, 3, 4, 1]]);
    }

    #[test]
    fn collate_rejects_ragged_shapes() {
        let err = ContourCollate.collate(vec![sample(4, 5, 1), sample(5, 5, 1)]);
        assert!(err.is_err());
    }

    #[test]
    fn datum_paths() {
        let d = DicomDatum {
            dicom: "SCD0000101/48.dcm".into(),
            i_contour: Some("SC-HF-I-1/i-contours/IM-0001-0048-icontour-manual.txt".into()),
            o_contour: None,
        };
        let root = Path::new("/data");
        assert_eq!(d.dicom_path(root), Path::new("/data/dicoms/SCD0000101/48.dcm"));
        assert_eq!(
            d.i_contour_path(root).unwrap(),
            Path::new("/data/contourfiles/SC-HF-I-1/i-contours/IM-0001-0048-icontour-manual.txt")
        );
        assert!(d.o_contour_path(root).is_none());
    }
}
