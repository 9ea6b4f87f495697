// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition service access
//!
//! `RecognitionClient` owns retry, timeout and cancellation over a pluggable
//! `RecognitionTransport` (HTTP or mock). `ConfidenceGate` decides whether a
//! result is good enough or the session should recapture.

pub mod client;
pub mod confidence;
pub mod http;
pub mod mock;
pub mod transport;
pub mod types;

pub use client::{RecognitionClient, RecognitionConfig, RetryPolicy};
pub use confidence::{ConfidenceGate, GateConfig, GateDecision};
pub use http::HttpTransport;
pub use mock::{MockConfig, MockTransport};
pub use transport::RecognitionTransport;
pub use types::{
    NetworkError, RecognitionRequest, RecognitionResponse, RecognitionResult, SubmitOptions,
};
