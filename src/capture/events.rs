// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Analytics events emitted by a capture session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

use super::session::CaptureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventKind {
    CameraStarted,
    CaptureInitiated,
    CaptureSuccess,
    CaptureFailed,
    ProcessingStarted,
    ProcessingSuccess,
    ProcessingFailed,
    UserCancelled,
    RetryAttempted,
}

impl AnalyticsEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalyticsEventKind::CameraStarted => "camera_started",
            AnalyticsEventKind::CaptureInitiated => "capture_initiated",
            AnalyticsEventKind::CaptureSuccess => "capture_success",
            AnalyticsEventKind::CaptureFailed => "capture_failed",
            AnalyticsEventKind::ProcessingStarted => "processing_started",
            AnalyticsEventKind::ProcessingSuccess => "processing_success",
            AnalyticsEventKind::ProcessingFailed => "processing_failed",
            AnalyticsEventKind::UserCancelled => "user_cancelled",
            AnalyticsEventKind::RetryAttempted => "retry_attempted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub kind: AnalyticsEventKind,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub capture_kind: CaptureKind,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl AnalyticsEvent {
    pub fn new(
        kind: AnalyticsEventKind,
        session_id: &str,
        capture_kind: CaptureKind,
        attempt: u32,
    ) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            capture_kind,
            attempt,
            confidence: None,
            duration_ms: None,
            error_code: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

/// Receives analytics events; implementations must not block
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: AnalyticsEvent) {
        info!(
            event = event.kind.as_str(),
            session_id = %event.session_id,
            capture_kind = %event.capture_kind,
            attempt = event.attempt,
            confidence = ?event.confidence,
            duration_ms = ?event.duration_ms,
            error_code = ?event.error_code,
            "Capture analytics event"
        );
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<AnalyticsEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: AnalyticsEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: AnalyticsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
