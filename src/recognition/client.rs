// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recognition client with bounded retry, per-call timeout and cancellation

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::http::HttpTransport;
use super::mock::{MockConfig, MockTransport};
use super::transport::RecognitionTransport;
use super::types::{NetworkError, RecognitionRequest, RecognitionResult, SubmitOptions};
use crate::capture::CaptureKind;
use crate::vision::NormalizedImage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per submit, including the first
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` is zero based
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.max(1.0).powi(attempt as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Retry without backoff between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            exponential_base: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("retry max_retries must be at least 1".to_string());
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "retry initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Service base URL; ignored when `mock.enabled`
    pub endpoint: String,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    pub mock: MockConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8090".to_string(),
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            mock: MockConfig::default(),
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("recognition timeout_ms must be greater than 0".to_string());
        }
        if !self.mock.enabled
            && !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://"))
        {
            return Err(format!(
                "recognition endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            ));
        }
        self.retry.validate()?;
        self.mock.validate()
    }
}

/// Submits normalized images and returns typed results
///
/// Retryable failures (timeouts, connection errors, 408/429/5xx) are retried
/// with exponential backoff up to `RetryPolicy::max_retries` attempts in
/// total. Other failures return immediately.
pub struct RecognitionClient {
    transport: Arc<dyn RecognitionTransport>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl RecognitionClient {
    pub fn new(transport: Arc<dyn RecognitionTransport>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            retry,
            timeout,
        }
    }

    /// Build the HTTP or mock client described by `config`
    pub fn from_config(config: &RecognitionConfig) -> Result<Self, NetworkError> {
        let transport: Arc<dyn RecognitionTransport> = if config.mock.enabled {
            info!("Recognition running in mock mode");
            Arc::new(MockTransport::new(config.mock.clone()))
        } else {
            Arc::new(HttpTransport::new(&config.endpoint, config.timeout())?)
        };
        Ok(Self::new(transport, config.retry.clone(), config.timeout()))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn submit(
        &self,
        image: &NormalizedImage,
        kind: CaptureKind,
        options: &SubmitOptions,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, NetworkError> {
        let request = RecognitionRequest::new(image, kind, options.metadata.clone());
        self.submit_request(&request, cancel).await
    }

    /// Send a prepared request with the retry loop
    pub async fn submit_request(
        &self,
        request: &RecognitionRequest,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, NetworkError> {
        let max_attempts = self.retry.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(NetworkError::Cancelled);
            }

            let start = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                r = tokio::time::timeout(self.timeout, self.transport.send(request)) => r,
            };

            let error = match outcome {
                Ok(Ok(response)) => {
                    let result = response.into_result(start.elapsed())?;
                    info!(
                        transport = self.transport.name(),
                        capture_kind = %request.capture_kind,
                        attempt = attempt + 1,
                        confidence = result.confidence,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Recognition succeeded"
                    );
                    return Ok(result);
                }
                Ok(Err(e)) => e,
                Err(_) => NetworkError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                },
            };

            if !error.is_retryable() {
                warn!(
                    transport = self.transport.name(),
                    attempt = attempt + 1,
                    "Recognition failed, not retrying: {}",
                    error
                );
                return Err(error);
            }

            warn!(
                transport = self.transport.name(),
                "Recognition attempt {}/{} failed: {} (took {}ms)",
                attempt + 1,
                max_attempts,
                error,
                start.elapsed().as_millis()
            );
            last_error = Some(error);

            if attempt + 1 < max_attempts {
                let delay = self.retry.delay_for(attempt);
                info!("Waiting {}ms before recognition retry", delay.as_millis());
                tokio::select! {
                    _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(NetworkError::Exhausted {
            attempts: max_attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| NetworkError::Connection("no attempt made".to_string())),
            ),
        })
    }
}
