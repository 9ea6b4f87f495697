// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport trait behind `RecognitionClient`

use async_trait::async_trait;

use super::types::{NetworkError, RecognitionRequest, RecognitionResponse};

/// One request/response exchange with a recognition backend
///
/// Implementations perform a single attempt; retry, timeout and
/// cancellation are handled by `RecognitionClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionTransport: Send + Sync {
    async fn send(&self, request: &RecognitionRequest) -> Result<RecognitionResponse, NetworkError>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}
