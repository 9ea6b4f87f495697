// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Cancellation from every phase releases the camera

use super::helpers::{counting_plugin, gate, machine, scripted, slow_client};
use fleet_vision_capture::camera::{CameraConstraints, SyntheticCamera};
use fleet_vision_capture::capture::{
    AnalyticsEventKind, CaptureInput, CaptureState, RecordingEventSink,
};
use fleet_vision_capture::plugins::{HookHandler, HookName, PluginDescriptor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_cancel_during_submit() {
    let camera = Arc::new(SyntheticCamera::new(640, 480));
    let sink = Arc::new(RecordingEventSink::new());
    let (on_cancel, cancels) = counting_plugin("cancel_counter", HookName::OnCancel);
    let (on_error, errors) = counting_plugin("error_counter", HookName::OnError);
    let mut m = machine(camera.clone(), slow_client(5_000), gate(0.9, 3))
        .with_event_sink(sink.clone());
    m.register_plugin(on_cancel).unwrap();
    m.register_plugin(on_error).unwrap();

    let cancel = m.cancel_handle();
    let started = Instant::now();
    let (outcome, _) = tokio::join!(
        m.run(CaptureInput::Camera(CameraConstraints::default())),
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        }
    );

    let report = outcome.unwrap();
    assert_eq!(report.state(), CaptureState::Cancelled);
    assert!(report.result.is_none());
    assert!(report.failure.is_none());
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(camera.live_streams(), 0);
    assert_eq!(m.open_camera_streams(), 0);
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(sink.count(AnalyticsEventKind::UserCancelled), 1);
}

#[tokio::test]
async fn test_cancel_before_start_opens_nothing() {
    let camera = Arc::new(SyntheticCamera::new(640, 480));
    let (mock, client) = scripted(vec![0.95]);
    let mut m = machine(camera.clone(), client, gate(0.9, 3));
    m.cancel_handle().cancel();

    let report = m
        .run(CaptureInput::Camera(CameraConstraints::default()))
        .await
        .unwrap();

    assert_eq!(report.state(), CaptureState::Cancelled);
    assert_eq!(camera.total_opened(), 0);
    assert_eq!(mock.calls(), 0);
    assert_eq!(report.session.attempts, 0);
}

#[tokio::test]
async fn test_failing_on_cancel_still_releases_camera() {
    let camera = Arc::new(SyntheticCamera::new(640, 480));
    let (_, client) = scripted(vec![0.95]);
    let mut m = machine(camera.clone(), client, gate(0.9, 3));
    m.register_plugin(PluginDescriptor::new("cleanup", "1.0.0").with_hook(
        HookName::OnCancel,
        HookHandler::lifecycle(|_| anyhow::bail!("upload queue closed")),
    ))
    .unwrap();

    m.start_camera().await.unwrap();
    assert_eq!(camera.live_streams(), 1);

    m.cancel().await.unwrap();
    assert_eq!(m.state(), CaptureState::Cancelled);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_step_methods_refuse_to_run_after_cancel() {
    let camera = Arc::new(SyntheticCamera::new(640, 480));
    let (mock, client) = scripted(vec![0.95]);
    let mut m = machine(camera, client, gate(0.9, 3));

    m.start_camera().await.unwrap();
    m.capture().await.unwrap();
    m.cancel().await.unwrap();

    assert!(m.normalize().await.is_err());
    assert!(m.submit().await.is_err());
    assert_eq!(m.state(), CaptureState::Cancelled);
    assert_eq!(mock.calls(), 0);
}
