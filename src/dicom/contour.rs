// src/dicom/contour.rs
//
// Contour annotation files and polygon rasterization.

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;

/// Parse a contour file: one `x y` pair of pixel coordinates per line.
pub fn parse_contour_file(path: &Path) -> Result<Vec<(f64, f64)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading contour file {}", path.display()))?;
    parse_contour(&text).with_context(|| format!("parsing contour file {}", path.display()))
}

pub fn parse_contour(text: &str) -> Result<Vec<(f64, f64)>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| -> Result<(f64, f64)> {
            let mut coords = line.split_whitespace();
            let mut next = |axis: &str| -> Result<f64> {
                let raw = coords
                    .next()
                    .with_context(|| format!("line {}: missing {} coordinate", n + 1, axis))?;
                raw.parse::<f64>()
                    .with_context(|| format!("line {}: bad {} coordinate {:?}", n + 1, axis, raw))
            };
            Ok((next("x")?, next("y")?))
        })
        .collect()
}

/// Rasterize `polygon` into a `(height, width)` boolean mask.
///
/// Pixel `(row, col)` sits at coordinate `(col, row)`.  The interior is
/// filled with the even-odd rule, then the polygon outline is drawn back in
/// as `false`, so boundary pixels are never part of the mask.
pub fn poly_to_mask(polygon: &[(f64, f64)], width: usize, height: usize) -> Array2<bool> {
    let mut mask = Array2::from_elem((height, width), false);
    if polygon.len() < 3 || width == 0 || height == 0 {
        return mask;
    }

    let edges = || polygon.iter().zip(polygon.iter().cycle().skip(1));

    let mut crossings = Vec::with_capacity(polygon.len());
    for row in 0..height {
        let y = row as f64;
        crossings.clear();
        for (&(x0, y0), &(x1, y1)) in edges() {
            if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            let start = span[0].ceil().max(0.0);
            let end = span[1].floor().min((width - 1) as f64);
            if start > end {
                continue;
            }
            for col in start as usize..=end as usize {
                mask[[row, col]] = true;
            }
        }
    }

    for (&a, &b) in edges() {
        clear_line(&mut mask, a, b);
    }
    mask
}

/// Bresenham from `a` to `b` (rounded to the pixel grid), clearing every pixel.
fn clear_line(mask: &mut Array2<bool>, a: (f64, f64), b: (f64, f64)) {
    let (height, width) = mask.dim();
    let (mut x, mut y) = (a.0.round() as i64, a.1.round() as i64);
    let (x1, y1) = (b.0.round() as i64, b.1.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (0..width as i64).contains(&x) && (0..height as i64).contains(&y) {
            mask[[y as usize, x as usize]] = false;
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
