// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP transport for the recognition service

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::transport::RecognitionTransport;
use super::types::{NetworkError, RecognitionRequest, RecognitionResponse};

const RECOGNIZE_PATH: &str = "/v1/recognize";
const HEALTH_PATH: &str = "/health";
/// Longest error body echoed into `NetworkError::Status`
const MAX_ERROR_BODY: usize = 512;

/// Posts `RecognitionRequest` JSON to `{endpoint}/v1/recognize`
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Setup(e.to_string()))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Recognition client configured: endpoint={}, timeout={}ms",
            endpoint,
            timeout.as_millis()
        );

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if the recognition service is reachable
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}{}", self.endpoint, HEALTH_PATH))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Recognition health check failed: {}", e);
                false
            }
        }
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if let Some(status) = e.status() {
            NetworkError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            NetworkError::InvalidResponse(e.to_string())
        } else {
            NetworkError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl RecognitionTransport for HttpTransport {
    async fn send(&self, request: &RecognitionRequest) -> Result<RecognitionResponse, NetworkError> {
        let url = format!("{}{}", self.endpoint, RECOGNIZE_PATH);
        debug!(
            url = %url,
            capture_kind = %request.capture_kind,
            image_chars = request.image.len(),
            "Posting recognition request"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("unknown").to_string();
            }
            return Err(NetworkError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_reqwest_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
