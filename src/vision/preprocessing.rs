// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Frame normalization before upload
//!
//! Steps:
//! 1. Validate declared MIME type and input size
//! 2. Decode, then undo the EXIF orientation when `auto_rotate` is set
//! 3. Clamp to `max_width` x `max_height` preserving aspect ratio (never upscale)
//! 4. Re-encode at the requested format/quality; the re-encode drops all
//!    source metadata unless `strip_metadata` is off
//!
//! Pixel work runs on the blocking pool so the caller's task stays responsive.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::exif::{self, Orientation};
use super::frame::RawFrame;
use super::image_utils::{decode_image_bytes, validate_input, OutputFormat, DEFAULT_MAX_INPUT_BYTES};

/// Lowest JPEG quality `compress_to_target_size` will go to (percent)
pub const MIN_QUALITY_PERCENT: u8 = 40;

/// Quality decrement per compression step (percent)
const QUALITY_STEP_PERCENT: u8 = 10;

/// Dimension scale applied once quality is exhausted
const DIMENSION_STEP: f32 = 0.8;

/// Smallest long edge `compress_to_target_size` will shrink to
pub const MIN_LONG_EDGE: u32 = 256;

#[derive(Debug, Error)]
pub enum PreprocessingError {
    #[error("Unsupported input type '{0}': expected an image/* MIME type")]
    InvalidType(String),

    #[error("Image data is too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    #[error("Invalid preprocessing options: {0}")]
    InvalidOptions(String),

    #[error("Preprocessing worker failed: {0}")]
    Worker(String),
}

impl PreprocessingError {
    /// Stable reason code for hosts and analytics
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidType(_) => "invalid-type",
            Self::TooLarge { .. } => "too-large",
            Self::DecodeFailed(_) => "decode-failed",
            Self::EncodeFailed(_) => "encode-failed",
            Self::InvalidOptions(_) => "invalid-options",
            Self::Worker(_) => "worker-failed",
        }
    }
}

/// Resampling filter used for the downscale step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(f: ResizeFilter) -> Self {
        match f {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Options for `ImagePreprocessor::normalize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality, 0.0-1.0 (lossy formats only)
    pub quality: f32,
    pub format: OutputFormat,
    pub auto_rotate: bool,
    pub strip_metadata: bool,
    pub max_input_bytes: usize,
    pub filter: ResizeFilter,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
            quality: 0.85,
            format: OutputFormat::Jpeg,
            auto_rotate: true,
            strip_metadata: true,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            filter: ResizeFilter::Triangle,
        }
    }
}

impl NormalizeOptions {
    pub fn validate(&self) -> Result<(), PreprocessingError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(PreprocessingError::InvalidOptions(
                "max_width and max_height must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(PreprocessingError::InvalidOptions(format!(
                "quality must be between 0 and 1, got {}",
                self.quality
            )));
        }
        if self.max_input_bytes == 0 {
            return Err(PreprocessingError::InvalidOptions(
                "max_input_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    fn quality_percent(&self) -> u8 {
        quality_to_percent(self.quality)
    }
}

fn quality_to_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Output of normalization; never mutated once produced
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    bytes: Bytes,
    width: u32,
    height: u32,
    format: OutputFormat,
    quality: f32,
    original_byte_size: usize,
    rotated: bool,
    orientation_applied: Orientation,
}

impl NormalizedImage {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Encoded size after normalization
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// Size of the input before normalization
    pub fn original_byte_size(&self) -> usize {
        self.original_byte_size
    }

    /// `original_byte_size / byte_size`; above 1.0 means the output shrank
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes.is_empty() || self.original_byte_size == 0 {
            return 1.0;
        }
        self.original_byte_size as f64 / self.bytes.len() as f64
    }

    pub fn rotated(&self) -> bool {
        self.rotated
    }

    pub fn orientation_applied(&self) -> Orientation {
        self.orientation_applied
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Decode the encoded output back into pixels
    pub fn decode(&self) -> Result<DynamicImage, PreprocessingError> {
        image::load_from_memory_with_format(&self.bytes, self.format.image_format())
            .map_err(|e| PreprocessingError::DecodeFailed(e.to_string()))
    }
}

/// Result of `compress_to_target_size`
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub image: NormalizedImage,
    /// Quality actually used for the returned encoding
    pub quality_used: f32,
    /// Whether the returned encoding fits the target
    pub met_target: bool,
}

/// Apply the transform an EXIF orientation describes, yielding orientation-1 pixels
pub fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270 => img.rotate270(),
    }
}

/// Largest dimensions within `max_w` x `max_h` keeping the aspect ratio; never upscales
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_w as f64 / width as f64)
        .min(max_h as f64 / height as f64)
        .min(1.0);
    if scale >= 1.0 {
        return (width, height);
    }
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

fn encode(img: &DynamicImage, format: OutputFormat, quality_percent: u8) -> Result<Vec<u8>, PreprocessingError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel; the lossless encoders keep it
    let result = match format {
        OutputFormat::Jpeg => img
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality_percent)),
        OutputFormat::Png => img.to_rgba8().write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::WebP => img
            .to_rgba8()
            .write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
    };
    result.map_err(|e| PreprocessingError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

/// A decoded, upright frame ready for resize/encode passes
struct PreparedFrame {
    image: DynamicImage,
    source_exif: Option<Vec<u8>>,
    orientation: Orientation,
    rotated: bool,
    original_byte_size: usize,
}

/// Turns raw frames and uploads into `NormalizedImage`s
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    offload: bool,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self { offload: true }
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run pixel work inline instead of on the blocking pool
    pub fn inline() -> Self {
        Self { offload: false }
    }

    /// Normalize a frame (see module docs for the steps)
    pub async fn normalize(
        &self,
        frame: RawFrame,
        options: &NormalizeOptions,
    ) -> Result<NormalizedImage, PreprocessingError> {
        if !self.offload {
            return self.normalize_blocking(frame, options);
        }
        let this = self.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || this.normalize_blocking(frame, &options))
            .await
            .map_err(|e| PreprocessingError::Worker(e.to_string()))?
    }

    /// Compress until the encoding fits `target_bytes` (best effort)
    pub async fn compress_to_target_size(
        &self,
        frame: RawFrame,
        target_bytes: usize,
        options: &NormalizeOptions,
    ) -> Result<CompressionOutcome, PreprocessingError> {
        if !self.offload {
            return self.compress_to_target_size_blocking(frame, target_bytes, options);
        }
        let this = self.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || {
            this.compress_to_target_size_blocking(frame, target_bytes, &options)
        })
        .await
        .map_err(|e| PreprocessingError::Worker(e.to_string()))?
    }

    pub fn normalize_blocking(
        &self,
        frame: RawFrame,
        options: &NormalizeOptions,
    ) -> Result<NormalizedImage, PreprocessingError> {
        let start = Instant::now();
        let prepared = self.prepare(&frame, options)?;
        let (w, h) = fit_within(
            prepared.image.width(),
            prepared.image.height(),
            options.max_width,
            options.max_height,
        );
        let image = self.render(&prepared, w, h, options, options.quality_percent())?;

        debug!(
            width = image.width,
            height = image.height,
            original_bytes = image.original_byte_size,
            output_bytes = image.byte_size(),
            compression_ratio = image.compression_ratio(),
            rotated = image.rotated,
            orientation = image.orientation_applied.exif_value(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Normalized frame"
        );
        Ok(image)
    }

    pub fn compress_to_target_size_blocking(
        &self,
        frame: RawFrame,
        target_bytes: usize,
        options: &NormalizeOptions,
    ) -> Result<CompressionOutcome, PreprocessingError> {
        if target_bytes == 0 {
            return Err(PreprocessingError::InvalidOptions(
                "target_bytes must be > 0".to_string(),
            ));
        }
        let prepared = self.prepare(&frame, options)?;
        let (mut w, mut h) = fit_within(
            prepared.image.width(),
            prepared.image.height(),
            options.max_width,
            options.max_height,
        );
        let mut quality = options.quality_percent();
        let mut best: Option<(NormalizedImage, u8)> = None;

        loop {
            let candidate = self.render(&prepared, w, h, options, quality)?;
            let size = candidate.byte_size();
            debug!(width = w, height = h, quality, size, target_bytes, "Compression step");

            if size <= target_bytes {
                return Ok(CompressionOutcome {
                    quality_used: quality as f32 / 100.0,
                    image: candidate,
                    met_target: true,
                });
            }
            if best.as_ref().map_or(true, |(b, _)| size < b.byte_size()) {
                best = Some((candidate, quality));
            }

            if options.format.is_lossy() && quality > MIN_QUALITY_PERCENT {
                quality = quality
                    .saturating_sub(QUALITY_STEP_PERCENT)
                    .max(MIN_QUALITY_PERCENT);
                continue;
            }

            let long_edge = w.max(h);
            let next_long = (long_edge as f32 * DIMENSION_STEP).round() as u32;
            if next_long < MIN_LONG_EDGE || next_long == long_edge {
                break;
            }
            let (nw, nh) = fit_within(w, h, next_long, next_long);
            w = nw;
            h = nh;
        }

        match best {
            Some((image, quality)) => {
                warn!(
                    target_bytes,
                    best_bytes = image.byte_size(),
                    "Could not meet compression target; returning smallest encoding"
                );
                Ok(CompressionOutcome {
                    image,
                    quality_used: quality as f32 / 100.0,
                    met_target: false,
                })
            }
            None => Err(PreprocessingError::EncodeFailed(
                "no encoding produced".to_string(),
            )),
        }
    }

    fn prepare(
        &self,
        frame: &RawFrame,
        options: &NormalizeOptions,
    ) -> Result<PreparedFrame, PreprocessingError> {
        options.validate()?;
        validate_input(frame.mime_type(), frame.byte_size(), options.max_input_bytes)?;

        let (img, _info) = decode_image_bytes(frame.data(), options.max_input_bytes)?;

        let orientation = if options.auto_rotate {
            frame
                .orientation()
                .or_else(|| exif::read_orientation(frame.data()))
                .unwrap_or_default()
        } else {
            Orientation::Normal
        };
        let image = apply_orientation(img, orientation);

        let source_exif = if options.strip_metadata {
            None
        } else {
            exif::find_exif_segment(frame.data()).map(|s| s.to_vec())
        };

        Ok(PreparedFrame {
            image,
            source_exif,
            orientation,
            rotated: !orientation.is_identity(),
            original_byte_size: frame.byte_size(),
        })
    }

    fn render(
        &self,
        prepared: &PreparedFrame,
        width: u32,
        height: u32,
        options: &NormalizeOptions,
        quality_percent: u8,
    ) -> Result<NormalizedImage, PreprocessingError> {
        let resized;
        let img = if (width, height) == (prepared.image.width(), prepared.image.height()) {
            &prepared.image
        } else {
            resized = prepared
                .image
                .resize_exact(width, height, options.filter.into());
            &resized
        };

        let mut encoded = encode(img, options.format, quality_percent)?;

        if let (Some(segment), OutputFormat::Jpeg) = (&prepared.source_exif, options.format) {
            let mut segment = segment.clone();
            if prepared.rotated {
                exif::rewrite_orientation(&mut segment, Orientation::Normal);
            }
            match exif::embed_segment(&encoded, &segment) {
                Ok(with_exif) => encoded = with_exif,
                Err(e) => warn!("Dropping source EXIF metadata: {}", e),
            }
        }

        Ok(NormalizedImage {
            bytes: Bytes::from(encoded),
            width,
            height,
            format: options.format,
            quality: if options.format.is_lossy() {
                quality_percent as f32 / 100.0
            } else {
                1.0
            },
            original_byte_size: prepared.original_byte_size,
            rotated: prepared.rotated,
            orientation_applied: prepared.orientation,
        })
    }
}
