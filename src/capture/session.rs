// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capture session identity and kind

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::CaptureState;

/// What is being captured; drives presets, remediation text and the
/// recognition service's model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureKind {
    Document,
    /// VIN plate
    IdentifierPlate,
    Odometer,
    LicensePlate,
    #[default]
    Generic,
}

impl CaptureKind {
    pub const ALL: [CaptureKind; 5] = [
        CaptureKind::Document,
        CaptureKind::IdentifierPlate,
        CaptureKind::Odometer,
        CaptureKind::LicensePlate,
        CaptureKind::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CaptureKind::Document => "document",
            CaptureKind::IdentifierPlate => "identifier-plate",
            CaptureKind::Odometer => "odometer",
            CaptureKind::LicensePlate => "license-plate",
            CaptureKind::Generic => "generic",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "vin" => Ok(CaptureKind::IdentifierPlate),
            "plate" => Ok(CaptureKind::LicensePlate),
            other => CaptureKind::ALL
                .into_iter()
                .find(|k| k.as_str() == other)
                .ok_or_else(|| format!("unknown capture kind '{}'", s)),
        }
    }
}

/// One capture attempt, owned by its `CaptureStateMachine`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub id: String,
    pub capture_kind: CaptureKind,
    pub state: CaptureState,
    /// Attempts made; 0 until the session leaves `selecting-input`
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn new(capture_kind: CaptureKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capture_kind,
            state: CaptureState::SelectingInput,
            attempts: 0,
            started_at: Utc::now(),
        }
    }
}
