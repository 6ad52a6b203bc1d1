// src/dicom/parser.rs
//
// Minimal DICOM Part-10 reader: just enough to pull monochrome pixel data
// out of uncompressed little-endian files.

use std::path::Path;

use bytes::Buf;
use ndarray::Array2;
use thiserror::Error;
use tracing::warn;

use crate::constants::{
    DICOM_MAGIC, DICOM_PREAMBLE_LEN, TRANSFER_SYNTAX_EXPLICIT_LE, TRANSFER_SYNTAX_IMPLICIT_LE,
};

#[derive(Error, Debug)]
pub enum DicomError {
    #[error("not a DICOM file (missing DICM preamble)")]
    NotDicom,

    #[error("truncated DICOM data at offset {0}")]
    Truncated(usize),

    #[error("unsupported transfer syntax {0}")]
    UnsupportedTransferSyntax(String),

    #[error("unsupported pixel data: {0}")]
    UnsupportedPixels(String),

    #[error("missing required element {0}")]
    MissingElement(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("pixel data holds {actual} bytes, expected {expected}")]
    PixelLength { expected: usize, actual: usize },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decoded slice: `pixels` has shape `(rows, columns)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomImage {
    pub pixels: Array2<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag(u16, u16);

const TRANSFER_SYNTAX: Tag = Tag(0x0002, 0x0010);
const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
const ROWS: Tag = Tag(0x0028, 0x0010);
const COLUMNS: Tag = Tag(0x0028, 0x0011);
const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
const RESCALE_INTERCEPT: Tag = Tag(0x0028, 0x1052);
const RESCALE_SLOPE: Tag = Tag(0x0028, 0x1053);
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

const ITEM: Tag = Tag(0xFFFE, 0xE000);
const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Explicit VRs whose length field is 4 bytes (after 2 reserved bytes).
const LONG_VRS: [&[u8; 2]; 13] = [
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT", b"UV",
];

/// Read `path`. Returns `Ok(None)` if the file is not DICOM at all.
pub fn read_dicom(path: &Path) -> Result<Option<DicomImage>, DicomError> {
    let raw = std::fs::read(path)?;
    match parse_dicom(&raw) {
        Ok(image) => Ok(Some(image)),
        Err(DicomError::NotDicom) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn parse_dicom(raw: &[u8]) -> Result<DicomImage, DicomError> {
    let magic_end = DICOM_PREAMBLE_LEN + DICOM_MAGIC.len();
    if raw.len() < magic_end || &raw[DICOM_PREAMBLE_LEN..magic_end] != DICOM_MAGIC {
        return Err(DicomError::NotDicom);
    }

    let mut reader = Reader { data: raw, pos: magic_end };

    // File meta group is always explicit VR little endian.
    let mut transfer_syntax = None;
    while reader.peek_tag().is_some_and(|tag| tag.0 == 0x0002) {
        let el = reader.read_element(true)?;
        if el.tag == TRANSFER_SYNTAX {
            transfer_syntax = Some(text_value(el.value));
        }
    }
    let explicit = match transfer_syntax.as_deref() {
        Some(TRANSFER_SYNTAX_IMPLICIT_LE) => false,
        Some(TRANSFER_SYNTAX_EXPLICIT_LE) => true,
        Some(other) => return Err(DicomError::UnsupportedTransferSyntax(other.to_string())),
        None => return Err(DicomError::MissingElement("TransferSyntaxUID")),
    };

    let mut fields = ImageFields::default();
    while !reader.is_empty() {
        let el = reader.read_element(explicit)?;
        match el.tag {
            SAMPLES_PER_PIXEL => fields.samples_per_pixel = Some(us_value("SamplesPerPixel", el.value)?),
            ROWS => fields.rows = Some(us_value("Rows", el.value)?),
            COLUMNS => fields.columns = Some(us_value("Columns", el.value)?),
            BITS_ALLOCATED => fields.bits_allocated = Some(us_value("BitsAllocated", el.value)?),
            PIXEL_REPRESENTATION => {
                fields.pixel_representation = Some(us_value("PixelRepresentation", el.value)?)
            }
            RESCALE_INTERCEPT => fields.intercept = Some(ds_value("RescaleIntercept", el.value)?),
            RESCALE_SLOPE => fields.slope = Some(ds_value("RescaleSlope", el.value)?),
            PIXEL_DATA => {
                if el.undefined_length {
                    return Err(DicomError::UnsupportedPixels("encapsulated pixel data".into()));
                }
                fields.pixel_data = Some(el.value);
            }
            _ => {}
        }
    }

    fields.decode()
}

#[derive(Default)]
struct ImageFields<'a> {
    rows: Option<u16>,
    columns: Option<u16>,
    samples_per_pixel: Option<u16>,
    bits_allocated: Option<u16>,
    pixel_representation: Option<u16>,
    intercept: Option<f64>,
    slope: Option<f64>,
    pixel_data: Option<&'a [u8]>,
}

impl ImageFields<'_> {
    fn decode(self) -> Result<DicomImage, DicomError> {
        let rows = self.rows.ok_or(DicomError::MissingElement("Rows"))? as usize;
        let columns = self.columns.ok_or(DicomError::MissingElement("Columns"))? as usize;
        let data = self.pixel_data.ok_or(DicomError::MissingElement("PixelData"))?;

        let samples = self.samples_per_pixel.unwrap_or(1);
        if samples != 1 {
            return Err(DicomError::UnsupportedPixels(format!("{samples} samples per pixel")));
        }

        let count = rows * columns;
        let bits = self.bits_allocated.unwrap_or(16);
        let signed = self.pixel_representation.unwrap_or(0) == 1;
        let expected = count * (bits as usize / 8).max(1);
        if data.len() < expected {
            return Err(DicomError::PixelLength { expected, actual: data.len() });
        }

        let mut pixels: Vec<i16> = match (bits, signed) {
            (16, true) => data[..expected]
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
            (16, false) => {
                // Unsigned values above i16::MAX saturate.
                let mut clamped = 0usize;
                let pixels: Vec<i16> = data[..expected]
                    .chunks_exact(2)
                    .map(|c| {
                        let v = u16::from_le_bytes([c[0], c[1]]);
                        if v > i16::MAX as u16 {
                            clamped += 1;
                        }
                        v.min(i16::MAX as u16) as i16
                    })
                    .collect();
                if clamped > 0 {
                    warn!("{} of {} unsigned pixels clamped to {}", clamped, count, i16::MAX);
                }
                pixels
            }
            (8, true) => data[..expected].iter().map(|&b| b as i8 as i16).collect(),
            (8, false) => data[..expected].iter().map(|&b| b as i16).collect(),
            (bits, _) => {
                return Err(DicomError::UnsupportedPixels(format!("{bits} bits allocated")));
            }
        };

        // Rescale only when both attributes are present and non-zero.
        let intercept = self.intercept.unwrap_or(0.0);
        let slope = self.slope.unwrap_or(0.0);
        if intercept != 0.0 && slope != 0.0 {
            for v in &mut pixels {
                let scaled = (*v as f64 * slope + intercept).round();
                *v = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            }
        }

        Ok(DicomImage {
            pixels: Array2::from_shape_vec((rows, columns), pixels)?,
        })
    }
}

struct Element<'a> {
    tag: Tag,
    value: &'a [u8],
    undefined_length: bool,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DicomError> {
        let end = self.pos.checked_add(n).ok_or(DicomError::Truncated(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(DicomError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DicomError> {
        let mut b = self.take(2)?;
        Ok(b.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, DicomError> {
        let mut b = self.take(4)?;
        Ok(b.get_u32_le())
    }

    fn tag(&mut self) -> Result<Tag, DicomError> {
        Ok(Tag(self.u16()?, self.u16()?))
    }

    fn peek_tag(&self) -> Option<Tag> {
        let mut b = self.data.get(self.pos..self.pos + 4)?;
        Some(Tag(b.get_u16_le(), b.get_u16_le()))
    }

    fn read_element(&mut self, explicit: bool) -> Result<Element<'a>, DicomError> {
        let tag = self.tag()?;
        let length = if explicit {
            let vr = self.take(2)?;
            if LONG_VRS.iter().any(|long| long.as_slice() == vr) {
                self.take(2)?;
                self.u32()?
            } else {
                self.u16()? as u32
            }
        } else {
            self.u32()?
        };

        if length == UNDEFINED_LENGTH {
            if tag != PIXEL_DATA {
                self.skip_sequence(explicit)?;
            }
            return Ok(Element { tag, value: &[], undefined_length: true });
        }

        let value = self.take(length as usize)?;
        Ok(Element { tag, value, undefined_length: false })
    }

    /// Skip the items of an undefined-length sequence, up to and including
    /// its delimiter.
    fn skip_sequence(&mut self, explicit: bool) -> Result<(), DicomError> {
        loop {
            let tag = self.tag()?;
            let length = self.u32()?;
            match tag {
                SEQUENCE_DELIMITER => return Ok(()),
                ITEM if length == UNDEFINED_LENGTH => self.skip_item(explicit)?,
                ITEM => {
                    self.take(length as usize)?;
                }
                Tag(group, element) => {
                    return Err(DicomError::InvalidValue {
                        name: "SequenceItem",
                        value: format!("({group:04X},{element:04X})"),
                    });
                }
            }
        }
    }

    fn skip_item(&mut self, explicit: bool) -> Result<(), DicomError> {
        loop {
            if self.peek_tag() == Some(ITEM_DELIMITER) {
                self.tag()?;
                self.u32()?;
                return Ok(());
            }
            self.read_element(explicit)?;
        }
    }
}

fn text_value(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn us_value(name: &'static str, value: &[u8]) -> Result<u16, DicomError> {
    let mut b = value;
    if b.len() < 2 {
        return Err(DicomError::InvalidValue { name, value: format!("{value:?}") });
    }
    Ok(b.get_u16_le())
}

/// Decimal String; only the first of several backslash-separated values is used.
fn ds_value(name: &'static str, value: &[u8]) -> Result<f64, DicomError> {
    let text = text_value(value);
    let first = text.split('\\').next().unwrap_or("").trim();
    first
        .parse::<f64>()
        .map_err(|_| DicomError::InvalidValue { name, value: text.clone() })
}
