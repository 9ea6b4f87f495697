// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Aggregate pipeline error and user-facing failure reasons

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::CaptureKind;
use super::state::InvalidTransition;
use crate::camera::{CameraAccessError, CaptureError};
use crate::plugins::{HookError, HookName, PluginError, RegistrationError, ValidationError};
use crate::recognition::NetworkError;
use crate::vision::PreprocessingError;

/// Any failure that ends a capture attempt
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    CameraAccess(#[from] CameraAccessError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Quality gate exhausted
    #[error("Confidence {confidence:.2} below threshold {threshold:.2} after {attempts} attempts")]
    LowConfidence {
        confidence: f64,
        threshold: f64,
        attempts: u32,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("Capture cancelled")]
    Cancelled,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl From<HookError> for PipelineError {
    fn from(e: HookError) -> Self {
        match e {
            HookError::Plugin(e) => PipelineError::Plugin(e),
            HookError::Validation(e) => PipelineError::Validation(e),
        }
    }
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::CameraAccess(e) => e.code(),
            PipelineError::Capture(e) => e.code(),
            PipelineError::Preprocessing(e) => e.code(),
            PipelineError::Network(e) => e.code(),
            PipelineError::LowConfidence { .. } => "low-confidence",
            PipelineError::Plugin(_) => "plugin-error",
            PipelineError::Validation(_) => "validation-failed",
            PipelineError::Registration(_) => "plugin-registration",
            PipelineError::Cancelled => "cancelled",
            PipelineError::InvalidTransition(_) => "invalid-transition",
        }
    }

    /// Whether the plugin runtime already ran `on-error` for this error
    pub fn on_error_ran(&self) -> bool {
        matches!(self, PipelineError::Plugin(_))
    }

    /// Structured reason for the caller to render
    pub fn reason(&self, kind: CaptureKind) -> FailureReason {
        let base = FailureReason::new(self.code(), self.to_string())
            .with_remediation(remediation(self, kind));
        match self {
            PipelineError::Plugin(e) => base.with_plugin(&e.plugin_id, Some(e.hook)),
            PipelineError::Validation(e) => {
                base.with_plugin(&e.plugin_id, Some(HookName::ValidateResult))
            }
            _ => base,
        }
    }
}

/// What went wrong and what the user can do about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookName>,
    pub remediation: String,
}

impl FailureReason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            plugin_id: None,
            hook: None,
            remediation: String::new(),
        }
    }

    pub fn with_plugin(mut self, plugin_id: &str, hook: Option<HookName>) -> Self {
        self.plugin_id = Some(plugin_id.to_string());
        self.hook = hook;
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    pub fn from_plugin_error(error: &PluginError) -> Self {
        FailureReason::new("plugin-error", error.to_string())
            .with_plugin(&error.plugin_id, Some(error.hook))
            .with_remediation("Try again; if it keeps failing, disable the plugin or contact support.")
    }
}

fn quality_hint(kind: CaptureKind) -> &'static str {
    match kind {
        CaptureKind::IdentifierPlate => {
            "Clean the VIN plate and hold the camera parallel to it, filling the frame guide."
        }
        CaptureKind::Odometer => {
            "Switch the ignition on so the odometer is lit and avoid glare on the cluster glass."
        }
        CaptureKind::LicensePlate => "Move closer so the plate fills the frame guide and is in focus.",
        CaptureKind::Document => {
            "Lay the document flat in even light with all four corners inside the frame."
        }
        CaptureKind::Generic => "Use better lighting and hold the camera steady.",
    }
}

fn remediation(error: &PipelineError, kind: CaptureKind) -> String {
    let text = match error {
        PipelineError::CameraAccess(CameraAccessError::PermissionDenied) => {
            "Allow camera access in the device settings, or upload a photo instead."
        }
        PipelineError::CameraAccess(CameraAccessError::NoDevice) => {
            "No camera was found. Upload a photo instead."
        }
        PipelineError::CameraAccess(CameraAccessError::DeviceBusy(_)) => {
            "Close other apps using the camera and try again."
        }
        PipelineError::CameraAccess(_) => "The camera could not be started. Try again or upload a photo.",
        PipelineError::Capture(_) => "The camera stopped before a photo was taken. Start the camera again.",
        PipelineError::Preprocessing(PreprocessingError::InvalidType(_)) => {
            "Choose an image file (JPEG, PNG or WebP)."
        }
        PipelineError::Preprocessing(PreprocessingError::TooLarge { .. }) => {
            "Choose a smaller image or take a new photo."
        }
        PipelineError::Preprocessing(PreprocessingError::DecodeFailed(_)) => {
            "The image could not be read. Take a new photo or choose another file."
        }
        PipelineError::Preprocessing(_) => "The image could not be prepared. Take a new photo.",
        PipelineError::Network(NetworkError::Status { status, .. }) if (400..500).contains(status) => {
            "The image was rejected by the recognition service. Take a new photo."
        }
        PipelineError::Network(_) => "Check your connection and try again.",
        PipelineError::LowConfidence { .. } | PipelineError::Validation(_) => quality_hint(kind),
        PipelineError::Plugin(_) | PipelineError::Registration(_) => {
            "Try again; if it keeps failing, disable the plugin or contact support."
        }
        PipelineError::Cancelled => "",
        PipelineError::InvalidTransition(_) => "Restart the capture.",
    };
    text.to_string()
}
