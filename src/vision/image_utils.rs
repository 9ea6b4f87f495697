// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and utility functions for captured frames

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use super::preprocessing::PreprocessingError;

/// Default maximum accepted input size (10MB)
pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Encodings the preprocessor can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    /// Lossless WebP; `quality` is ignored
    WebP,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// Whether `quality` influences the encoded size
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Some(Self::Jpeg),
            "png" | "image/png" => Some(Self::Png),
            "webp" | "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// Size in bytes
    pub size_bytes: usize,
}

/// Check a declared MIME type and byte size before any decoding happens
pub fn validate_input(
    mime_type: &str,
    size_bytes: usize,
    max_input_bytes: usize,
) -> Result<(), PreprocessingError> {
    let mime = mime_type.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") || mime.len() == "image/".len() {
        return Err(PreprocessingError::InvalidType(mime_type.to_string()));
    }
    if size_bytes == 0 {
        return Err(PreprocessingError::DecodeFailed("image data is empty".to_string()));
    }
    if size_bytes > max_input_bytes {
        return Err(PreprocessingError::TooLarge {
            size: size_bytes,
            max: max_input_bytes,
        });
    }
    Ok(())
}

/// Decode raw image bytes (camera frames and file uploads)
///
/// # Arguments
/// * `bytes` - Raw image bytes
/// * `max_input_bytes` - Upper bound on accepted input size
///
/// # Returns
/// * `Ok((DynamicImage, ImageInfo))` - The decoded image and metadata
/// * `Err(PreprocessingError)` - If validation or decoding fails
pub fn decode_image_bytes(
    bytes: &[u8],
    max_input_bytes: usize,
) -> Result<(DynamicImage, ImageInfo), PreprocessingError> {
    if bytes.len() > max_input_bytes {
        return Err(PreprocessingError::TooLarge {
            size: bytes.len(),
            max: max_input_bytes,
        });
    }

    if bytes.is_empty() {
        return Err(PreprocessingError::DecodeFailed("image data is empty".to_string()));
    }

    // Detect format from magic bytes
    let format = detect_format(bytes)?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PreprocessingError::DecodeFailed(e.to_string()))?;

    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
    };

    Ok((img, info))
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, PreprocessingError> {
    if bytes.len() < 4 {
        return Err(PreprocessingError::DecodeFailed(
            "unrecognized image signature".to_string(),
        ));
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(PreprocessingError::DecodeFailed(
            "unrecognized image signature".to_string(),
        )),
    }
}

/// Best-effort MIME type for raw bytes, used when a host hands over a file without one
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    detect_format(bytes).ok().map(|format| match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    })
}

/// Get the format extension as a string
pub fn format_to_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => "unknown",
    }
}
