// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wire types and errors for the recognition service

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::capture::CaptureKind;
use crate::vision::NormalizedImage;

/// Typed result of one successful recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    /// Opaque structured payload extracted from the image
    pub data: serde_json::Value,
    /// Estimated correctness, 0.0-1.0
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub raw_response_id: String,
}

/// Request body sent to the recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    /// Base64 encoded image bytes
    pub image: String,
    /// MIME type of `image`
    pub format: String,
    pub capture_kind: CaptureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RecognitionRequest {
    pub fn new(
        image: &NormalizedImage,
        capture_kind: CaptureKind,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            image: image.to_base64(),
            format: image.format().mime_type().to_string(),
            capture_kind,
            metadata,
        }
    }
}

/// Response body returned by the recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResponse {
    #[serde(default)]
    pub data: serde_json::Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RecognitionResponse {
    /// Convert into a result, rejecting confidences outside 0..=1
    ///
    /// `elapsed` stands in for `processingTimeMs` when the service omits it;
    /// a missing `id` gets a generated one.
    pub fn into_result(self, elapsed: Duration) -> Result<RecognitionResult, NetworkError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(NetworkError::InvalidResponse(format!(
                "confidence {} outside 0..1",
                self.confidence
            )));
        }
        Ok(RecognitionResult {
            data: self.data,
            confidence: self.confidence,
            processing_time_ms: self
                .processing_time_ms
                .unwrap_or(elapsed.as_millis() as u64),
            raw_response_id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        })
    }
}

/// Per-call options for `RecognitionClient::submit`
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Forwarded as the request's `metadata` object
    pub metadata: Option<serde_json::Value>,
}

/// Errors talking to the recognition service
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Request exceeded the per-call timeout
    #[error("Recognition request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Service answered with a non-success HTTP status
    #[error("Recognition service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Transport-level failure (DNS, refused connection, reset)
    #[error("Recognition service unreachable: {0}")]
    Connection(String),

    /// Service answered with a body we cannot use
    #[error("Invalid recognition response: {0}")]
    InvalidResponse(String),

    /// Caller aborted the request
    #[error("Recognition request cancelled")]
    Cancelled,

    /// All attempts failed with retryable errors
    #[error("Recognition failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<NetworkError> },

    /// Client could not be constructed
    #[error("Recognition client setup failed: {0}")]
    Setup(String),
}

impl NetworkError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection(_) => true,
            Self::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::InvalidResponse(_) | Self::Cancelled | Self::Exhausted { .. } | Self::Setup(_) => {
                false
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "network-timeout",
            Self::Status { status, .. } if (400..500).contains(status) => "request-rejected",
            Self::Status { .. } => "service-error",
            Self::Connection(_) => "network-unreachable",
            Self::InvalidResponse(_) => "invalid-response",
            Self::Cancelled => "cancelled",
            Self::Exhausted { .. } => "network-retries-exhausted",
            Self::Setup(_) => "client-setup",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
