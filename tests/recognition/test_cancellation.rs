// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Cancelling an in-flight recognition call

use super::stub_service::{sample_image, Reply, StubService};
use fleet_vision_capture::capture::CaptureKind;
use fleet_vision_capture::recognition::{
    HttpTransport, MockConfig, MockTransport, NetworkError, RecognitionClient, RetryPolicy,
    SubmitOptions,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancel_aborts_slow_http_call() {
    let service =
        StubService::start_with_delay(vec![Reply::ok(0.9)], Duration::from_secs(10)).await;
    let timeout = Duration::from_secs(30);
    let transport = HttpTransport::new(&service.endpoint, timeout).unwrap();
    let client = RecognitionClient::new(Arc::new(transport), RetryPolicy::immediate(3), timeout);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = assert_err!(
        client
            .submit(&sample_image(), CaptureKind::Generic, &SubmitOptions::default(), &cancel)
            .await
    );
    assert!(matches!(err, NetworkError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let service = StubService::start(vec![Reply::status(503)]).await;
    let timeout = Duration::from_secs(5);
    let transport = HttpTransport::new(&service.endpoint, timeout).unwrap();
    let retry = RetryPolicy {
        max_retries: 3,
        initial_delay_ms: 10_000,
        max_delay_ms: 10_000,
        exponential_base: 1.0,
    };
    let client = RecognitionClient::new(Arc::new(transport), retry, timeout);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .submit(&sample_image(), CaptureKind::Generic, &SubmitOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cancelled");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_sends_nothing() {
    let mock = Arc::new(MockTransport::with_confidences(vec![0.9]));
    let client = RecognitionClient::new(mock.clone(), RetryPolicy::immediate(3), Duration::from_secs(1));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .submit(&sample_image(), CaptureKind::Generic, &SubmitOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Cancelled));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_mock_latency_is_applied() {
    let mock = MockTransport::new(MockConfig {
        enabled: true,
        delay_ms: 80,
        ..Default::default()
    });
    let client = RecognitionClient::new(Arc::new(mock), RetryPolicy::immediate(1), Duration::from_secs(2));

    let started = Instant::now();
    let result = assert_ok!(
        client
            .submit(
                &sample_image(),
                CaptureKind::IdentifierPlate,
                &SubmitOptions::default(),
                &CancellationToken::new(),
            )
            .await
    );
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(result.confidence, 0.95);
    assert_eq!(result.data["vin"], "1M8GDM9AXKP042788");
}
