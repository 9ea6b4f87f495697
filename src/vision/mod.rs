// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image handling for captured frames
//!
//! This module provides:
//! - EXIF orientation parsing and rewriting on raw byte buffers
//! - Format detection and input validation
//! - Normalization (orientation, resize, re-encode) and target-size compression
//!
//! Pixel work runs on the blocking pool so capture sessions stay responsive.

pub mod exif;
pub mod frame;
pub mod image_utils;
pub mod preprocessing;

pub use exif::Orientation;
pub use frame::{FrameSource, RawFrame};
pub use image_utils::{detect_format, sniff_mime_type, ImageInfo, OutputFormat};
pub use preprocessing::{
    apply_orientation, fit_within, CompressionOutcome, ImagePreprocessor, NormalizeOptions,
    NormalizedImage, PreprocessingError, ResizeFilter,
};
