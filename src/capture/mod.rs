// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capture sessions
//!
//! - `state` - the pure transition table
//! - `machine` - `CaptureStateMachine`, the single integration point driving
//!   camera, preprocessing, plugins, recognition and the confidence gate
//! - `batch` - multi-page documents
//! - `presets` - scanner parameterizations (VIN, odometer, plate, document)
//! - `events` - analytics events and sinks
//! - `errors` - aggregate error and user-facing failure reasons

pub mod batch;
pub mod errors;
pub mod events;
pub mod machine;
pub mod presets;
pub mod session;
pub mod state;

pub use batch::{
    BatchConfig, BatchError, BatchOrchestrator, BatchReport, CapturedPage, PageOutcome,
    PageStatus, PageSubmitter, SessionPageSubmitter, SubmitStrategy,
};
pub use errors::{FailureReason, PipelineError};
pub use events::{
    AnalyticsEvent, AnalyticsEventKind, EventSink, RecordingEventSink, TracingEventSink,
};
pub use machine::{CaptureInput, CaptureReport, CaptureStateMachine, ImageSummary};
pub use presets::{FrameGuide, ScannerPreset};
pub use session::{CaptureKind, CaptureSession};
pub use state::{transition, CaptureEvent, CaptureState, Effect, InvalidTransition, Transition};
