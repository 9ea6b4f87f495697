// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capture-and-recognition pipeline for fleet record keeping
//!
//! A `CaptureStateMachine` drives one session: camera acquisition or file
//! upload, image normalization, plugin hooks around every phase, submission
//! to a recognition service and confidence-gated recapture. A
//! `BatchOrchestrator` groups normalized pages for multi-page documents.

pub mod camera;
pub mod capture;
pub mod cli;
pub mod config;
pub mod plugins;
pub mod recognition;
pub mod vision;

pub use camera::{CameraAccessError, CameraController, CameraDevice, SyntheticCamera};
pub use capture::{
    BatchOrchestrator, CaptureInput, CaptureKind, CaptureReport, CaptureState,
    CaptureStateMachine, FailureReason, PipelineError, ScannerPreset, SubmitStrategy,
};
pub use config::{CaptureConfig, ConfigError};
pub use plugins::{HookHandler, HookName, PluginContext, PluginDescriptor, PluginRuntime};
pub use recognition::{
    ConfidenceGate, GateConfig, NetworkError, RecognitionClient, RecognitionConfig,
    RecognitionResult, RetryPolicy,
};
pub use vision::{ImagePreprocessor, NormalizeOptions, NormalizedImage, RawFrame};
