// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Camera hardware access
//!
//! - `device` - traits a platform camera implements
//! - `controller` - single-owner stream lifecycle for one capture session
//! - `synthetic` - deterministic test/headless device

pub mod controller;
pub mod device;
pub mod synthetic;

pub use controller::{CameraController, StreamHandle};
pub use device::{
    CameraAccessError, CameraConstraints, CameraDevice, CameraStream, CaptureError, FacingMode,
};
pub use synthetic::{SyntheticCamera, SyntheticFailure};
