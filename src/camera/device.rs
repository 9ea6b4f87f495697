// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Camera device and stream traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vision::RawFrame;

/// Errors opening a camera stream; terminal for the current attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraAccessError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device available")]
    NoDevice,

    #[error("Camera device is busy: {0}")]
    DeviceBusy(String),

    #[error("Camera constraints cannot be satisfied: {0}")]
    Unsatisfiable(String),

    #[error("Camera error: {0}")]
    Other(String),
}

impl CameraAccessError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "camera-permission-denied",
            Self::NoDevice => "camera-not-found",
            Self::DeviceBusy(_) => "camera-busy",
            Self::Unsatisfiable(_) => "camera-constraints",
            Self::Other(_) => "camera-error",
        }
    }
}

/// Errors sampling a frame from the current stream
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No active camera stream")]
    NoActiveStream,

    #[error("Camera stream {0} has ended")]
    StreamEnded(String),

    #[error("Failed to sample frame: {0}")]
    Sample(String),
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveStream => "no-active-stream",
            Self::StreamEnded(_) => "stream-ended",
            Self::Sample(_) => "frame-sample-failed",
        }
    }
}

/// Which camera to prefer on multi-camera devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

/// Stream request hints; devices pick the closest supported mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: Some(1920),
            ideal_height: Some(1080),
        }
    }
}

/// A live stream opened by a `CameraDevice`
pub trait CameraStream: Send + Sync {
    fn id(&self) -> &str;

    /// Sample the current video frame
    fn sample(&mut self) -> Result<RawFrame, CaptureError>;

    /// Stop every track of the stream; calling twice is a no-op
    fn stop(&mut self) -> anyhow::Result<()>;

    fn is_live(&self) -> bool;
}

/// Source of camera streams (platform camera API, test double, ...)
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Open a new stream matching `constraints`
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, CameraAccessError>;

    /// Device name for logging
    fn name(&self) -> &str;
}
