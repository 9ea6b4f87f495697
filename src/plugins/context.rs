// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-session scratch state shared by all hook invocations

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::capture::errors::FailureReason;
use crate::capture::CaptureKind;
use crate::recognition::RecognitionResult;
use crate::vision::NormalizedImage;

/// Mutable context threaded through every hook of one session
///
/// Handlers run one at a time, so whatever a plugin writes here is seen by
/// every plugin registered after it.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub session_id: String,
    pub capture_kind: CaptureKind,
    /// Current attempt, starting at 1
    pub attempt: u32,
    /// Image submitted by the current attempt
    pub image: Option<Arc<NormalizedImage>>,
    /// Free-form metadata; forwarded to the recognition service
    pub metadata: Map<String, Value>,
    /// Latest recognition result, after transform/enrich hooks
    pub result: Option<RecognitionResult>,
    /// Set while `on-error` hooks run
    pub last_error: Option<FailureReason>,
}

impl PluginContext {
    pub fn new(session_id: impl Into<String>, capture_kind: CaptureKind) -> Self {
        Self {
            session_id: session_id.into(),
            capture_kind,
            attempt: 0,
            image: None,
            metadata: Map::new(),
            result: None,
            last_error: None,
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata_value(&self) -> Option<Value> {
        if self.metadata.is_empty() {
            None
        } else {
            Some(Value::Object(self.metadata.clone()))
        }
    }

    /// Drop per-attempt state before a recapture
    pub fn reset_attempt(&mut self) {
        self.image = None;
        self.result = None;
        self.last_error = None;
    }
}
