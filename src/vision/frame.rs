// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Raw captured frames, before normalization

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::exif::{self, Orientation};
use super::image_utils::sniff_mime_type;

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSource {
    Camera,
    Upload,
}

/// An encoded image buffer as produced by a camera or a file selection
#[derive(Debug, Clone)]
pub struct RawFrame {
    data: Bytes,
    mime_type: String,
    width: u32,
    height: u32,
    orientation: Option<Orientation>,
    source: FrameSource,
}

impl RawFrame {
    /// Frame sampled from a live camera stream
    pub fn from_camera(
        data: impl Into<Bytes>,
        mime_type: &str,
        width: u32,
        height: u32,
        orientation: Option<Orientation>,
    ) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.to_string(),
            width,
            height,
            orientation,
            source: FrameSource::Camera,
        }
    }

    /// Frame from a user-selected file
    ///
    /// Natural dimensions and the EXIF orientation are read from the header
    /// only; both are left unset when the bytes cannot be parsed, and decoding
    /// errors surface later from the preprocessor.
    pub fn from_upload(data: impl Into<Bytes>, mime_type: &str) -> Self {
        let data: Bytes = data.into();
        let (width, height) = image::ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
            .unwrap_or((0, 0));
        let orientation = exif::read_orientation(&data);

        Self {
            data,
            mime_type: mime_type.to_string(),
            width,
            height,
            orientation,
            source: FrameSource::Upload,
        }
    }

    /// Upload whose MIME type is sniffed from the content
    pub fn from_upload_sniffed(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let mime = sniff_mime_type(&data).unwrap_or("application/octet-stream");
        Self::from_upload(data, mime)
    }

    /// Override the orientation tag (e.g. a host that already parsed EXIF)
    pub fn with_orientation(mut self, orientation: Option<Orientation>) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    pub fn source(&self) -> FrameSource {
        self.source
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}
