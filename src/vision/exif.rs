// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Minimal EXIF reader/writer for the orientation tag
//!
//! Works on raw byte buffers only; no pixel decoding happens here. Supports
//! JPEG files (APP1 "Exif" segment) and bare TIFF headers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EXIF tag id for orientation
const ORIENTATION_TAG: u16 = 0x0112;

/// TIFF field type SHORT (u16)
const TYPE_SHORT: u16 = 3;

const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP1: u8 = 0xE1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExifError {
    #[error("Data is not a JPEG stream")]
    NotJpeg,

    #[error("JPEG segment table is truncated at offset {0}")]
    Truncated(usize),

    #[error("EXIF segment too large: {0} bytes")]
    SegmentTooLarge(usize),
}

/// EXIF orientation (tag 0x0112), values 1..=8
///
/// Each variant names the transform a viewer must apply to the stored pixels
/// to display them upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Orientation {
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    /// Map a raw EXIF value; anything outside 1..=8 is rejected
    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::FlipHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::FlipVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    pub fn exif_value(self) -> u8 {
        self as u8
    }

    pub fn is_identity(self) -> bool {
        self == Self::Normal
    }

    /// Orientations 5-8 exchange width and height when applied
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    pub fn all() -> [Orientation; 8] {
        [
            Self::Normal,
            Self::FlipHorizontal,
            Self::Rotate180,
            Self::FlipVertical,
            Self::Transpose,
            Self::Rotate90,
            Self::Transverse,
            Self::Rotate270,
        ]
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::Normal
    }
}

impl From<Orientation> for u8 {
    fn from(o: Orientation) -> Self {
        o.exif_value()
    }
}

impl TryFrom<u8> for Orientation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Orientation::from_exif(value as u16)
            .ok_or_else(|| format!("invalid EXIF orientation {}", value))
    }
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes([b[0], b[1]]),
            Self::Big => u16::from_be_bytes([b[0], b[1]]),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Self::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn write_u16(self, b: &mut [u8], v: u16) {
        let bytes = match self {
            Self::Little => v.to_le_bytes(),
            Self::Big => v.to_be_bytes(),
        };
        b[..2].copy_from_slice(&bytes);
    }
}

/// A JPEG marker segment: marker byte plus the byte range it occupies
/// (including the 0xFF marker prefix and length field)
#[derive(Debug, Clone, Copy)]
struct Segment {
    marker: u8,
    start: usize,
    end: usize,
}

impl Segment {
    /// Payload after the two length bytes
    fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.start + 4..self.end]
    }

    fn is_exif(&self, bytes: &[u8]) -> bool {
        self.marker == MARKER_APP1 && self.payload(bytes).starts_with(EXIF_HEADER)
    }
}

/// Walk the marker segments preceding the entropy-coded data
fn jpeg_segments(bytes: &[u8]) -> Result<Vec<Segment>, ExifError> {
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != MARKER_SOI {
        return Err(ExifError::NotJpeg);
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(ExifError::Truncated(pos));
        }
        // Fill bytes
        let mut marker_pos = pos + 1;
        while marker_pos < bytes.len() && bytes[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        if marker_pos >= bytes.len() {
            return Err(ExifError::Truncated(marker_pos));
        }
        let marker = bytes[marker_pos];
        if marker == MARKER_EOI || marker == MARKER_SOS {
            break;
        }
        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos = marker_pos + 1;
            continue;
        }
        if marker_pos + 2 >= bytes.len() {
            return Err(ExifError::Truncated(marker_pos));
        }
        let len = u16::from_be_bytes([bytes[marker_pos + 1], bytes[marker_pos + 2]]) as usize;
        let end = marker_pos + 1 + len;
        if len < 2 || end > bytes.len() {
            return Err(ExifError::Truncated(marker_pos));
        }
        segments.push(Segment {
            marker,
            start: marker_pos - 1,
            end,
        });
        pos = end;
    }
    Ok(segments)
}

/// Locate the orientation entry inside a TIFF block
///
/// Returns the byte order and the offset of the entry's value field.
fn locate_orientation(tiff: &[u8]) -> Option<(ByteOrder, usize)> {
    if tiff.len() < 8 {
        return None;
    }
    let order = match &tiff[..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.u16(&tiff[2..4]) != 42 {
        return None;
    }
    let ifd = order.u32(&tiff[4..8]) as usize;
    if ifd + 2 > tiff.len() {
        return None;
    }
    let count = order.u16(&tiff[ifd..ifd + 2]) as usize;
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        if entry + 12 > tiff.len() {
            return None;
        }
        let tag = order.u16(&tiff[entry..entry + 2]);
        if tag != ORIENTATION_TAG {
            continue;
        }
        if order.u16(&tiff[entry + 2..entry + 4]) != TYPE_SHORT {
            return None;
        }
        return Some((order, entry + 8));
    }
    None
}

fn orientation_from_tiff(tiff: &[u8]) -> Option<Orientation> {
    let (order, value_at) = locate_orientation(tiff)?;
    Orientation::from_exif(order.u16(&tiff[value_at..value_at + 2]))
}

/// Read the EXIF orientation from a JPEG or TIFF buffer
///
/// Returns `None` if the buffer carries no (valid) orientation tag.
pub fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return orientation_from_tiff(bytes);
    }
    let segments = jpeg_segments(bytes).ok()?;
    segments
        .iter()
        .find(|s| s.is_exif(bytes))
        .and_then(|s| orientation_from_tiff(&s.payload(bytes)[EXIF_HEADER.len()..]))
}

/// Return the complete APP1 EXIF segment (marker through last payload byte)
pub fn find_exif_segment(jpeg: &[u8]) -> Option<&[u8]> {
    let segments = jpeg_segments(jpeg).ok()?;
    segments
        .iter()
        .find(|s| s.is_exif(jpeg))
        .map(|s| &jpeg[s.start..s.end])
}

/// Build an APP1 segment containing only an orientation tag
pub fn orientation_segment(orientation: Orientation) -> Vec<u8> {
    let mut tiff = Vec::with_capacity(26);
    tiff.extend_from_slice(b"MM\0*");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&ORIENTATION_TAG.to_be_bytes());
    tiff.extend_from_slice(&TYPE_SHORT.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&(orientation.exif_value() as u16).to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
    let mut segment = Vec::with_capacity(len as usize + 2);
    segment.extend_from_slice(&[0xFF, MARKER_APP1]);
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    segment
}

/// Insert an APP1 segment directly after SOI, replacing any existing EXIF segment
pub fn embed_segment(jpeg: &[u8], segment: &[u8]) -> Result<Vec<u8>, ExifError> {
    if segment.len() > u16::MAX as usize + 2 {
        return Err(ExifError::SegmentTooLarge(segment.len()));
    }
    let segments = jpeg_segments(jpeg)?;

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(segment);

    let mut copied_to = 2;
    for s in segments.iter().filter(|s| s.is_exif(jpeg)) {
        out.extend_from_slice(&jpeg[copied_to..s.start]);
        copied_to = s.end;
    }
    out.extend_from_slice(&jpeg[copied_to..]);
    Ok(out)
}

/// Overwrite the orientation value inside an APP1 segment
///
/// Returns false when the segment has no orientation entry.
pub fn rewrite_orientation(segment: &mut [u8], orientation: Orientation) -> bool {
    let tiff_start = 4 + EXIF_HEADER.len();
    if segment.len() < tiff_start || &segment[4..tiff_start] != EXIF_HEADER {
        return false;
    }
    match locate_orientation(&segment[tiff_start..]) {
        Some((order, value_at)) => {
            let at = tiff_start + value_at;
            order.write_u16(&mut segment[at..at + 2], orientation.exif_value() as u16);
            true
        }
        None => false,
    }
}
