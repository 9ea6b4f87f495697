// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scanner presets: capture kind, gate threshold, frame guide and default
//! plugins for each supported scanner

use serde::Serialize;
use serde_json::{json, Value};

use super::session::CaptureKind;
use crate::plugins::{HookHandler, HookName, PluginDescriptor};
use crate::vision::NormalizeOptions;

pub const VIN_CHECK_DIGIT_PLUGIN: &str = "vin_check_digit";
pub const CAPTURE_METADATA_PLUGIN: &str = "capture_metadata";

const VIN_WEIGHTS: [u32; 17] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// On-screen guide the host draws over the viewfinder
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameGuide {
    /// Width / height of the guide rectangle
    pub aspect_ratio: f64,
    /// Guide width as a fraction of the viewfinder width
    pub width_fraction: f64,
    pub label: &'static str,
}

#[derive(Debug, Clone)]
pub struct ScannerPreset {
    pub name: &'static str,
    pub kind: CaptureKind,
    pub threshold: f64,
    pub guide: FrameGuide,
    max_edge: Option<u32>,
    quality: Option<f32>,
}

impl ScannerPreset {
    pub fn vin() -> Self {
        Self {
            name: "vin",
            kind: CaptureKind::IdentifierPlate,
            threshold: 0.9,
            guide: FrameGuide {
                aspect_ratio: 6.0,
                width_fraction: 0.9,
                label: "Align the VIN inside the frame",
            },
            max_edge: Some(1920),
            quality: Some(0.9),
        }
    }

    pub fn odometer() -> Self {
        Self {
            name: "odometer",
            kind: CaptureKind::Odometer,
            threshold: 0.85,
            guide: FrameGuide {
                aspect_ratio: 3.0,
                width_fraction: 0.7,
                label: "Fit the odometer reading in the frame",
            },
            max_edge: Some(1280),
            quality: None,
        }
    }

    pub fn license_plate() -> Self {
        Self {
            name: "license-plate",
            kind: CaptureKind::LicensePlate,
            threshold: 0.85,
            guide: FrameGuide {
                aspect_ratio: 4.5,
                width_fraction: 0.8,
                label: "Center the plate in the frame",
            },
            max_edge: Some(1280),
            quality: None,
        }
    }

    pub fn document() -> Self {
        Self {
            name: "document",
            kind: CaptureKind::Document,
            threshold: 0.75,
            guide: FrameGuide {
                aspect_ratio: 0.707,
                width_fraction: 0.85,
                label: "Keep all four corners inside the frame",
            },
            max_edge: Some(2480),
            quality: Some(0.8),
        }
    }

    pub fn generic() -> Self {
        Self {
            name: "generic",
            kind: CaptureKind::Generic,
            threshold: 0.8,
            guide: FrameGuide {
                aspect_ratio: 4.0 / 3.0,
                width_fraction: 0.9,
                label: "Frame the subject",
            },
            max_edge: None,
            quality: None,
        }
    }

    pub fn for_kind(kind: CaptureKind) -> Self {
        match kind {
            CaptureKind::IdentifierPlate => Self::vin(),
            CaptureKind::Odometer => Self::odometer(),
            CaptureKind::LicensePlate => Self::license_plate(),
            CaptureKind::Document => Self::document(),
            CaptureKind::Generic => Self::generic(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        name.parse::<CaptureKind>().ok().map(Self::for_kind)
    }

    /// `base` with this preset's size and quality overrides applied
    pub fn normalize_options(&self, base: &NormalizeOptions) -> NormalizeOptions {
        let mut options = base.clone();
        if let Some(edge) = self.max_edge {
            options.max_width = edge;
            options.max_height = edge;
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        options
    }

    /// Plugins every session using this preset starts with
    pub fn default_plugins(&self) -> Vec<PluginDescriptor> {
        let mut plugins = Vec::new();
        if self.kind == CaptureKind::IdentifierPlate {
            plugins.push(vin_check_digit_plugin());
        }
        plugins.push(capture_metadata_plugin());
        plugins
    }

    /// Metadata forwarded with each recognition request
    pub fn metadata(&self) -> Value {
        json!({ "preset": self.name, "frameGuide": self.guide })
    }
}

fn transliterate(c: char) -> Option<u32> {
    let value = match c {
        '0'..='9' => c.to_digit(10)?,
        'A' | 'J' => 1,
        'B' | 'K' | 'S' => 2,
        'C' | 'L' | 'T' => 3,
        'D' | 'M' | 'U' => 4,
        'E' | 'N' | 'V' => 5,
        'F' | 'W' => 6,
        'G' | 'P' | 'X' => 7,
        'H' | 'Y' => 8,
        'R' | 'Z' => 9,
        _ => return None,
    };
    Some(value)
}

/// ISO 3779 check digit (position 9) validation
pub fn vin_check_digit_valid(vin: &str) -> bool {
    let vin = vin.trim().to_ascii_uppercase();
    if vin.len() != 17 {
        return false;
    }
    let mut sum = 0;
    for (c, weight) in vin.chars().zip(VIN_WEIGHTS) {
        match transliterate(c) {
            Some(v) => sum += v * weight,
            None => return false,
        }
    }
    let expected = match sum % 11 {
        10 => 'X',
        d => char::from_digit(d, 10).unwrap_or('?'),
    };
    vin.chars().nth(8) == Some(expected)
}

/// Rejects results whose `vin` fails the check digit
pub fn vin_check_digit_plugin() -> PluginDescriptor {
    PluginDescriptor::new(VIN_CHECK_DIGIT_PLUGIN, env!("CARGO_PKG_VERSION")).with_hook(
        HookName::ValidateResult,
        HookHandler::validate(|payload, _ctx| {
            Ok(payload
                .get("vin")
                .and_then(Value::as_str)
                .map_or(false, vin_check_digit_valid))
        }),
    )
}

/// Stamps session, attempt and image facts into `data._capture`
pub fn capture_metadata_plugin() -> PluginDescriptor {
    PluginDescriptor::new(CAPTURE_METADATA_PLUGIN, env!("CARGO_PKG_VERSION")).with_hook(
        HookName::EnrichResult,
        HookHandler::result(|mut payload, ctx| {
            if !payload.is_object() {
                return Ok(payload);
            }
            let mut stamp = json!({
                "sessionId": ctx.session_id,
                "captureKind": ctx.capture_kind,
                "attempt": ctx.attempt,
            });
            if let Some(image) = &ctx.image {
                stamp["width"] = json!(image.width());
                stamp["height"] = json!(image.height());
                stamp["format"] = json!(image.format().mime_type());
                stamp["rotated"] = json!(image.rotated());
            }
            payload["_capture"] = stamp;
            Ok(payload)
        }),
    )
}
