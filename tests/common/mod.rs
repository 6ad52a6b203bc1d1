// tests/common/mod.rs
//
// Shared fixtures: a tiny DICOM writer and a synthetic data root.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

const IMPLICIT_LE: &str = "1.2.840.10008.1.2";

fn implicit(group: u16, element: u16, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + value.len());
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
    out
}

/// Implicit-VR little-endian slice with signed 16-bit pixels in row-major order.
pub fn dicom_bytes(rows: u16, cols: u16, pixels: &[i16]) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");

    // meta group is explicit VR: (0002,0010) UI
    let mut ts = IMPLICIT_LE.as_bytes().to_vec();
    if ts.len() % 2 == 1 {
        ts.push(0);
    }
    out.extend_from_slice(&0x0002u16.to_le_bytes());
    out.extend_from_slice(&0x0010u16.to_le_bytes());
    out.extend_from_slice(b"UI");
    out.extend_from_slice(&(ts.len() as u16).to_le_bytes());
    out.extend_from_slice(&ts);

    out.extend(implicit(0x0028, 0x0002, &1u16.to_le_bytes()));
    out.extend(implicit(0x0028, 0x0010, &rows.to_le_bytes()));
    out.extend(implicit(0x0028, 0x0011, &cols.to_le_bytes()));
    out.extend(implicit(0x0028, 0x0100, &16u16.to_le_bytes()));
    out.extend(implicit(0x0028, 0x0103, &1u16.to_le_bytes()));
    let data: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
    out.extend(implicit(0x7FE0, 0x0010, &data));
    out
}

pub fn write_dicom(path: &Path, rows: u16, cols: u16, fill: i16) {
    let pixels = vec![fill; rows as usize * cols as usize];
    fs::write(path, dicom_bytes(rows, cols, &pixels)).unwrap();
}

/// Closed square from `(lo, lo)` to `(hi, hi)` in contour file format.
pub fn square_contour(lo: f64, hi: f64) -> String {
    format!("{lo} {lo}\n{hi} {lo}\n{hi} {hi}\n{lo} {hi}\n")
}

/// One patient's worth of synthetic data.
pub struct Patient<'a> {
    pub dicom: &'a str,
    pub contour: &'a str,
    /// Slice indices written as `<index>.dcm`.
    pub slices: Vec<u32>,
    /// Slices that get an inner contour.
    pub inner: Vec<u32>,
    /// Slices that get an outer contour.
    pub outer: Vec<u32>,
}

/// Build a data root under a fresh temp dir; every slice is `rows x cols`
/// and filled with its own index.
pub fn data_root(patients: &[Patient<'_>], rows: u16, cols: u16) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let mut link = String::from("patient_id,original_id\n");
    for p in patients {
        link.push_str(&format!("{},{}\n", p.dicom, p.contour));

        let dicoms = root.join("dicoms").join(p.dicom);
        fs::create_dir_all(&dicoms).unwrap();
        for &i in &p.slices {
            write_dicom(&dicoms.join(format!("{i}.dcm")), rows, cols, i as i16);
        }

        let contours = root.join("contourfiles").join(p.contour);
        for (dir, letter, set) in [("i-contours", 'i', &p.inner), ("o-contours", 'o', &p.outer)] {
            let d = contours.join(dir);
            fs::create_dir_all(&d).unwrap();
            for &i in set.iter() {
                let name = format!("IM-0001-{i:04}-{letter}contour-manual.txt");
                fs::write(d.join(name), square_contour(2.0, (cols.min(rows) - 3) as f64)).unwrap();
            }
        }
    }
    fs::write(root.join("link.csv"), link).unwrap();
    dir
}
