// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Offline transport with configurable latency, payload and failures
//!
//! Used when no recognition service is configured, and by tests that need
//! scripted confidence sequences.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::transport::RecognitionTransport;
use super::types::{NetworkError, RecognitionRequest, RecognitionResponse};
use crate::capture::CaptureKind;

const DEFAULT_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Route recognition through this transport instead of HTTP
    pub enabled: bool,
    /// Simulated service latency per call
    pub delay_ms: u64,
    /// Fixed payload; a per-kind sample is used when unset
    pub data: Option<serde_json::Value>,
    /// Probability (0.0-1.0) that a call fails with a retryable 503
    pub failure_rate: f64,
    /// Confidence for call N; the last value repeats once exhausted
    pub confidences: Vec<f64>,
    /// Seed for failure injection, random when unset
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 300,
            data: None,
            failure_rate: 0.0,
            confidences: vec![DEFAULT_CONFIDENCE],
            seed: None,
        }
    }
}

impl MockConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(format!(
                "mock failure_rate must be within 0..1, got {}",
                self.failure_rate
            ));
        }
        if let Some(c) = self.confidences.iter().find(|c| !(0.0..=1.0).contains(*c)) {
            return Err(format!("mock confidence must be within 0..1, got {}", c));
        }
        Ok(())
    }
}

pub struct MockTransport {
    config: MockConfig,
    rng: Mutex<StdRng>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience for scripted confidence sequences with no latency
    pub fn with_confidences(confidences: Vec<f64>) -> Self {
        Self::new(MockConfig {
            enabled: true,
            delay_ms: 0,
            confidences,
            ..Default::default()
        })
    }

    /// Calls received so far, including injected failures
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn confidence_for(&self, call: usize) -> f64 {
        self.config
            .confidences
            .get(call)
            .or_else(|| self.config.confidences.last())
            .copied()
            .unwrap_or(DEFAULT_CONFIDENCE)
    }

    fn should_fail(&self) -> bool {
        if self.config.failure_rate <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        rng.gen::<f64>() < self.config.failure_rate
    }
}

/// Representative payload per capture kind
pub fn sample_payload(kind: CaptureKind) -> serde_json::Value {
    match kind {
        CaptureKind::IdentifierPlate => json!({ "vin": "1M8GDM9AXKP042788" }),
        CaptureKind::Odometer => json!({ "reading": 48213, "unit": "km" }),
        CaptureKind::LicensePlate => json!({ "plate": "KX21 ABC", "region": "GB" }),
        CaptureKind::Document => json!({ "text": "SERVICE RECORD", "fields": {} }),
        CaptureKind::Generic => json!({ "labels": ["vehicle"] }),
    }
}

#[async_trait]
impl RecognitionTransport for MockTransport {
    async fn send(&self, request: &RecognitionRequest) -> Result<RecognitionResponse, NetworkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }

        if self.should_fail() {
            debug!(call, "Mock recognition injecting failure");
            return Err(NetworkError::Status {
                status: 503,
                message: "injected failure".to_string(),
            });
        }

        let confidence = self.confidence_for(call);
        debug!(call, confidence, capture_kind = %request.capture_kind, "Mock recognition response");
        Ok(RecognitionResponse {
            data: self
                .config
                .data
                .clone()
                .unwrap_or_else(|| sample_payload(request.capture_kind)),
            confidence,
            processing_time_ms: Some(self.config.delay_ms),
            id: Some(format!("mock-{}", uuid::Uuid::new_v4())),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
