// src/dicom/assemble.rs
//
// Walks a data root and pairs every DICOM slice with its contour files.
//
// Layout:
//   <root>/link.csv                         header, then `dicom,contour` rows
//   <root>/dicoms/<dicom>/<index>.dcm
//   <root>/contourfiles/<contour>/i-contours/IM-0001-<index:04>-icontour-manual.txt
//   <root>/contourfiles/<contour>/o-contours/IM-0001-<index:04>-ocontour-manual.txt

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::constants::{
    CONTOURS_DIR, CONTOUR_INDEX_WIDTH, DICOMS_DIR, I_CONTOURS_DIR, LINK_FILE, O_CONTOURS_DIR,
};
use crate::data_loader::dataset::ItemSource;
use crate::dicom::sample::DicomDatum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourKind {
    Inner,
    Outer,
}

impl ContourKind {
    fn letter(self) -> char {
        match self {
            ContourKind::Inner => 'i',
            ContourKind::Outer => 'o',
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            ContourKind::Inner => I_CONTOURS_DIR,
            ContourKind::Outer => O_CONTOURS_DIR,
        }
    }
}

/// File name of the manual contour for slice `index`.
pub fn contour_file_name(index: u32, kind: ContourKind) -> String {
    format!(
        "IM-0001-{:0width$}-{}contour-manual.txt",
        index,
        kind.letter(),
        width = CONTOUR_INDEX_WIDTH
    )
}

/// One row of `link.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub dicom: String,
    pub contour: String,
}

/// Parse `link.csv` text. The first line is a header.
pub fn parse_links(text: &str) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    for (n, line) in text.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cols = line.split(',').map(str::trim);
        match (cols.next(), cols.next()) {
            (Some(dicom), Some(contour)) if !dicom.is_empty() && !contour.is_empty() => {
                links.push(Link {
                    dicom: dicom.to_string(),
                    contour: contour.to_string(),
                })
            }
            _ => bail!("{} line {}: expected `dicom,contour`, got {:?}", LINK_FILE, n + 1, line),
        }
    }
    Ok(links)
}

/// A data root on the local filesystem.
#[derive(Debug, Clone)]
pub struct DicomDirectory {
    root: PathBuf,
}

impl DicomDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn links(&self) -> Result<Vec<Link>> {
        let path = self.root.join(LINK_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        parse_links(&text)
    }

    fn patient(&self, link: &Link, out: &mut Vec<DicomDatum>) -> Result<()> {
        let inner = self.contour_names(&link.contour, ContourKind::Inner)?;
        let outer = self.contour_names(&link.contour, ContourKind::Outer)?;

        let dir = self.root.join(DICOMS_DIR).join(&link.dicom);
        let mut slices = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match slice_index(&name) {
                Some(index) => slices.push((index, name)),
                None => debug!("skipping {}: not a numbered slice", entry.path().display()),
            }
        }
        slices.sort();

        let lookup = |names: &HashSet<String>, index: u32, kind: ContourKind| {
            let name = contour_file_name(index, kind);
            names
                .contains(&name)
                .then(|| format!("{}/{}/{}", link.contour, kind.dir_name(), name))
        };

        for (index, name) in &slices {
            out.push(DicomDatum {
                dicom: format!("{}/{}", link.dicom, name),
                i_contour: lookup(&inner, *index, ContourKind::Inner),
                o_contour: lookup(&outer, *index, ContourKind::Outer),
            });
        }
        debug!(
            "{} -> {}: {} slices, {} inner, {} outer contours",
            link.dicom,
            link.contour,
            slices.len(),
            inner.len(),
            outer.len()
        );
        Ok(())
    }

    fn contour_names(&self, contour: &str, kind: ContourKind) -> Result<HashSet<String>> {
        let dir = self.root.join(CONTOURS_DIR).join(contour).join(kind.dir_name());
        if !dir.is_dir() {
            warn!("{} does not exist, no {} contours", dir.display(), kind.dir_name());
            return Ok(HashSet::new());
        }
        let mut names = HashSet::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            names.insert(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

fn slice_index(file_name: &str) -> Option<u32> {
    file_name.strip_suffix(".dcm").unwrap_or(file_name).parse().ok()
}

impl ItemSource for DicomDirectory {
    type Item = DicomDatum;

    fn assemble(&self) -> Result<Vec<DicomDatum>> {
        let mut data = Vec::new();
        let links = self.links()?;
        for link in &links {
            self.patient(link, &mut data)
                .with_context(|| format!("assembling patient {}", link.dicom))?;
        }
        info!(
            "{}: {} patients, {} datums",
            self.root.display(),
            links.len(),
            data.len()
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contour_names_are_zero_padded() {
        assert_eq!(
            contour_file_name(48, ContourKind::Inner),
            "IM-0001-0048-icontour-manual.txt"
        );
        assert_eq!(
            contour_file_name(1234, ContourKind::Outer),
            "IM-0001-1234-ocontour-manual.txt"
        );
    }

    #[test]
    fn links_skip_header_and_blanks() {
        let links = parse_links("patient_id,original_id\nSCD0000101,SC-HF-I-1\n\nSCD0000201, SC-HF-I-2\n")
            .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].dicom, "SCD0000201");
        assert_eq!(links[1].contour, "SC-HF-I-2");
        assert!(parse_links("header\n").unwrap().is_empty());
    }

    #[test]
    fn short_link_row_is_an_error() {
        let err = parse_links("h\nA,B\nC\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn slice_names() {
        assert_eq!(slice_index("48.dcm"), Some(48));
        assert_eq!(slice_index("7"), Some(7));
        assert_eq!(slice_index("notes.txt"), None);
    }
}
