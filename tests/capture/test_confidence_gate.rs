// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Confidence gating across recapture attempts

use super::helpers::{counting_plugin, gate, machine, scripted};
use fleet_vision_capture::camera::{CameraConstraints, SyntheticCamera};
use fleet_vision_capture::capture::{
    AnalyticsEventKind, CaptureInput, CaptureState, PipelineError, RecordingEventSink,
};
use fleet_vision_capture::plugins::{HookHandler, HookName, PluginDescriptor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn camera_input() -> CaptureInput {
    CaptureInput::Camera(CameraConstraints::default())
}

#[tokio::test]
async fn test_recaptures_until_threshold_met() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (mock, client) = scripted(vec![0.5, 0.7, 0.95]);
    let sink = Arc::new(RecordingEventSink::new());
    let (on_retry, retries) = counting_plugin("retry_counter", HookName::OnRetry);
    let (on_success, successes) = counting_plugin("success_counter", HookName::OnSuccess);

    let mut m = machine(camera.clone(), client, gate(0.9, 3)).with_event_sink(sink.clone());
    m.register_plugin(on_retry).unwrap();
    m.register_plugin(on_success).unwrap();

    let report = m.run(camera_input()).await.unwrap();

    assert_eq!(report.state(), CaptureState::Success);
    assert!(report.is_success());
    assert_eq!(report.session.attempts, 3);
    assert_eq!(report.result.as_ref().unwrap().confidence, 0.95);
    assert!(report.finished_at.is_some());
    assert!(report.failure.is_none());
    assert_eq!(mock.calls(), 3);
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.count(AnalyticsEventKind::RetryAttempted), 2);
    assert_eq!(sink.count(AnalyticsEventKind::ProcessingSuccess), 1);
    assert_eq!(camera.total_opened(), 1, "recapture reuses the open stream");
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_exhausted_attempts_end_in_low_confidence() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (mock, client) = scripted(vec![0.5]);
    let (on_error, errors) = counting_plugin("error_counter", HookName::OnError);
    let mut m = machine(camera.clone(), client, gate(0.9, 2));
    m.register_plugin(on_error).unwrap();

    let err = m.run(camera_input()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::LowConfidence { attempts: 2, .. }
    ));
    assert_eq!(m.state(), CaptureState::Error);
    assert_eq!(m.attempts(), 2);
    assert_eq!(mock.calls(), 2);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    let failure = m.failure().unwrap();
    assert_eq!(failure.code, "low-confidence");
    assert!(!failure.remediation.is_empty());
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_retry_after_exhaustion_starts_fresh() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (_, client) = scripted(vec![0.5, 0.5, 0.97]);
    let mut m = machine(camera.clone(), client, gate(0.9, 2));

    m.run(camera_input()).await.unwrap_err();
    m.retry().await.unwrap();
    assert_eq!(m.state(), CaptureState::SelectingInput);
    assert_eq!(m.attempts(), 0);

    let report = m.run(camera_input()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.session.attempts, 1);
    assert_eq!(camera.total_opened(), 2);
}

#[tokio::test]
async fn test_validation_rejection_fails_by_default() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (mock, client) = scripted(vec![0.99]);
    let mut m = machine(camera, client, gate(0.9, 3));
    m.register_plugin(
        PluginDescriptor::new("reading_range", "1.0.0")
            .with_hook(HookName::ValidateResult, HookHandler::validate(|_, _| Ok(false))),
    )
    .unwrap();

    let err = m.run(camera_input()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(ref v) if v.plugin_id == "reading_range"));
    assert_eq!(m.attempts(), 1);
    assert_eq!(mock.calls(), 1);
    let failure = m.failure().unwrap();
    assert_eq!(failure.code, "validation-failed");
    assert_eq!(failure.plugin_id.as_deref(), Some("reading_range"));
}

#[tokio::test]
async fn test_validation_rejection_consumes_attempts_when_enabled() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (mock, client) = scripted(vec![0.99]);
    let validations = Arc::new(AtomicUsize::new(0));
    let seen = validations.clone();
    let mut m = machine(camera, client, gate(0.9, 3)).with_retry_on_validation_failure(true);
    m.register_plugin(PluginDescriptor::new("third_time_lucky", "1.0.0").with_hook(
        HookName::ValidateResult,
        HookHandler::validate(move |_, _| Ok(seen.fetch_add(1, Ordering::SeqCst) >= 2)),
    ))
    .unwrap();

    let report = m.run(camera_input()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.session.attempts, 3);
    assert_eq!(validations.load(Ordering::SeqCst), 3);
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_persistent_rejection_exhausts_shared_budget() {
    let camera = Arc::new(SyntheticCamera::new(320, 240));
    let (mock, client) = scripted(vec![0.99]);
    let mut m = machine(camera, client, gate(0.9, 2)).with_retry_on_validation_failure(true);
    m.register_plugin(
        PluginDescriptor::new("never", "1.0.0")
            .with_hook(HookName::ValidateResult, HookHandler::validate(|_, _| Ok(false))),
    )
    .unwrap();

    let err = m.run(camera_input()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(m.attempts(), 2);
    assert_eq!(mock.calls(), 2);
}
