// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Multi-page ordering, capacity and submission strategies

use super::helpers::{counting_plugin, gate, normalized, scripted};
use async_trait::async_trait;
use fleet_vision_capture::camera::SyntheticCamera;
use fleet_vision_capture::capture::{
    AnalyticsEventKind, BatchError, BatchOrchestrator, CaptureKind, CapturedPage, PageStatus,
    PageSubmitter, PipelineError, RecordingEventSink, SessionPageSubmitter, SubmitStrategy,
};
use fleet_vision_capture::plugins::{HookHandler, HookName, PluginDescriptor};
use fleet_vision_capture::recognition::{RecognitionClient, RecognitionResult};
use fleet_vision_capture::vision::FrameSource;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Records how many pages are in flight at once
#[derive(Default)]
struct ConcurrencyTracker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl PageSubmitter for ConcurrencyTracker {
    async fn submit_page(
        &self,
        page: &CapturedPage,
        _kind: CaptureKind,
        _cancel: &CancellationToken,
    ) -> Result<RecognitionResult, PipelineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Later pages finish first to show outcomes keep page order
        let delay = 60u64.saturating_sub(page.page_number as u64 * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RecognitionResult {
            data: json!({ "page": page.page_number }),
            confidence: 0.9,
            processing_time_ms: delay,
            raw_response_id: page.id.clone(),
        })
    }
}

fn sessions(client: Arc<RecognitionClient>) -> (SessionPageSubmitter, Arc<SyntheticCamera>) {
    let camera = Arc::new(SyntheticCamera::new(640, 480));
    (SessionPageSubmitter::new(client, camera.clone()), camera)
}

/// Rejects the result of the page with `page_number`
fn reject_page(page_number: u32) -> PluginDescriptor {
    PluginDescriptor::new("page-auditor", "1.0.0").with_hook(
        HookName::ValidateResult,
        HookHandler::validate(move |_payload, ctx| {
            Ok(ctx.metadata.get("pageNumber") != Some(&json!(page_number)))
        }),
    )
}

fn batch_of(widths: &[u32]) -> BatchOrchestrator {
    let mut batch = BatchOrchestrator::new(CaptureKind::Document, 20);
    for &w in widths {
        batch.add_page(normalized(w, 40), FrameSource::Upload).unwrap();
    }
    batch
}

fn widths(batch: &BatchOrchestrator) -> Vec<u32> {
    batch.pages().iter().map(|p| p.image.width()).collect()
}

fn numbers(batch: &BatchOrchestrator) -> Vec<u32> {
    batch.pages().iter().map(|p| p.page_number).collect()
}

#[test]
fn test_reorder_moves_last_page_first() {
    // Pages A, B, C told apart by width
    let mut batch = batch_of(&[40, 50, 60]);
    batch.reorder(2, 0).unwrap();
    assert_eq!(widths(&batch), vec![60, 40, 50]);
    assert_eq!(numbers(&batch), vec![1, 2, 3]);

    assert_eq!(
        batch.reorder(0, 3),
        Err(BatchError::IndexOutOfRange { index: 3, len: 3 })
    );
}

#[test]
fn test_remove_renumbers_remaining_pages() {
    let mut batch = batch_of(&[40, 50, 60]);
    let middle = batch.pages()[1].id.clone();
    let removed = batch.remove_page(&middle).unwrap();
    assert_eq!(removed.image.width(), 50);
    assert_eq!(widths(&batch), vec![40, 60]);
    assert_eq!(numbers(&batch), vec![1, 2]);
    assert!(matches!(
        batch.remove_page(&middle),
        Err(BatchError::PageNotFound(_))
    ));
}

#[test]
fn test_capacity_is_enforced() {
    let mut batch = BatchOrchestrator::new(CaptureKind::Document, 2);
    batch.add_page(normalized(40, 40), FrameSource::Camera).unwrap();
    batch.add_page(normalized(40, 40), FrameSource::Camera).unwrap();
    let err = batch
        .add_page(normalized(40, 40), FrameSource::Camera)
        .unwrap_err();
    assert_eq!(err, BatchError::Capacity { max: 2 });
    assert_eq!(err.code(), "capacity");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.remaining_capacity(), 0);
}

#[tokio::test]
async fn test_sequential_submission_gates_each_page() {
    // page 2 is retried once, then exhausts its budget of two attempts
    let (mock, client) = scripted(vec![0.95, 0.4, 0.5, 0.92]);
    let (submitter, camera) = sessions(client);
    let submitter = submitter.with_gate(gate(0.9, 2));
    let mut batch = batch_of(&[40, 50, 60]);

    let report = batch
        .submit_all(SubmitStrategy::Sequential, &submitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.calls(), 4);
    assert_eq!(camera.total_opened(), 0);
    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.all_succeeded());
    match &report.pages[1].status {
        PageStatus::Failed { reason } => {
            assert_eq!(reason.code, "low-confidence");
            assert!(reason.message.contains("after 2 attempts"), "{}", reason.message);
        }
        other => panic!("page 2 should fail, got {other:?}"),
    }
    assert!(batch.is_frozen());
    assert_eq!(
        batch.add_page(normalized(40, 40), FrameSource::Upload).unwrap_err(),
        BatchError::Frozen
    );
}

#[tokio::test]
async fn test_parallel_submission_is_bounded_and_ordered() {
    let tracker = ConcurrencyTracker::default();
    let mut batch = batch_of(&[40, 44, 48, 52, 56]);

    let report = batch
        .submit_all(
            SubmitStrategy::ParallelBounded(2),
            &tracker,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert!(tracker.peak.load(Ordering::SeqCst) <= 2);
    let order: Vec<u32> = report.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
    for outcome in &report.pages {
        match &outcome.status {
            PageStatus::Succeeded { result } => {
                assert_eq!(result.data["page"], outcome.page_number)
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cancelled_batch_reports_every_page_cancelled() {
    let (mock, client) = scripted(vec![0.95]);
    let (submitter, _) = sessions(client);
    let mut batch = batch_of(&[40, 50]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = batch
        .submit_all(SubmitStrategy::Sequential, &submitter, &cancel)
        .await
        .unwrap();

    assert_eq!(mock.calls(), 0);
    assert!(report
        .pages
        .iter()
        .all(|p| matches!(p.status, PageStatus::Cancelled)));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["pages"][0]["status"], "cancelled");
    assert_eq!(json["pages"][0]["pageNumber"], 1);
}

#[tokio::test]
async fn test_empty_batch_and_zero_parallelism_are_rejected() {
    let tracker = ConcurrencyTracker::default();
    let mut empty = BatchOrchestrator::new(CaptureKind::Document, 5);
    assert_eq!(
        empty
            .submit_all(SubmitStrategy::Sequential, &tracker, &CancellationToken::new())
            .await
            .unwrap_err(),
        BatchError::Empty
    );

    let mut batch = batch_of(&[40]);
    assert_eq!(
        batch
            .submit_all(SubmitStrategy::ParallelBounded(0), &tracker, &CancellationToken::new())
            .await
            .unwrap_err(),
        BatchError::InvalidParallelism
    );
    assert!(!batch.is_frozen());
}

#[tokio::test]
async fn test_validator_rejection_fails_only_its_page() {
    let (mock, client) = scripted(vec![0.95]);
    let (on_success, succeeded) = counting_plugin("success-counter", HookName::OnSuccess);
    let (on_error, errored) = counting_plugin("error-counter", HookName::OnError);
    let events = Arc::new(RecordingEventSink::new());
    let (submitter, camera) = sessions(client);
    let submitter = submitter
        .with_plugin(reject_page(2))
        .with_plugin(on_success)
        .with_plugin(on_error)
        .with_event_sink(events.clone());
    let mut batch = batch_of(&[40, 50, 60]);

    let report = batch
        .submit_all(SubmitStrategy::Sequential, &submitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.calls(), 3);
    assert_eq!(report.succeeded(), 2);
    match &report.pages[1].status {
        PageStatus::Failed { reason } => {
            assert_eq!(reason.code, "validation-failed");
            assert_eq!(reason.plugin_id.as_deref(), Some("page-auditor"));
            assert_eq!(reason.hook, Some(HookName::ValidateResult));
        }
        other => panic!("page 2 should fail validation, got {other:?}"),
    }
    assert_eq!(succeeded.load(Ordering::SeqCst), 2);
    assert_eq!(errored.load(Ordering::SeqCst), 1);
    assert_eq!(events.count(AnalyticsEventKind::ProcessingSuccess), 2);
    assert_eq!(events.count(AnalyticsEventKind::ProcessingFailed), 1);
    assert_eq!(camera.total_opened(), 0);

    // preset plugins ran inside each page session
    match &report.pages[0].status {
        PageStatus::Succeeded { result } => {
            assert_eq!(result.data["_capture"]["captureKind"], "document");
        }
        other => panic!("page 1 should succeed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_validator_rejection_can_consume_page_attempts() {
    let (mock, client) = scripted(vec![0.95]);
    let rejected_once = Arc::new(AtomicUsize::new(0));
    let seen = rejected_once.clone();
    let flaky = PluginDescriptor::new("first-read-skeptic", "1.0.0").with_hook(
        HookName::ValidateResult,
        HookHandler::validate(move |_payload, ctx| {
            if ctx.attempt > 1 {
                return Ok(true);
            }
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }),
    );
    let (submitter, _) = sessions(client);
    let submitter = submitter
        .with_gate(gate(0.9, 2))
        .with_retry_on_validation_failure(true)
        .with_plugin(flaky);
    let mut batch = batch_of(&[40, 50]);

    let report = batch
        .submit_all(SubmitStrategy::ParallelBounded(2), &submitter, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(rejected_once.load(Ordering::SeqCst), 2);
    assert_eq!(mock.calls(), 4);
}

#[tokio::test]
async fn test_batch_cancel_reaches_running_page_session() {
    let client = super::helpers::slow_client(5_000);
    let (submitter, camera) = sessions(client);
    let mut batch = batch_of(&[40, 50]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let (report, _) = tokio::join!(
        batch.submit_all(SubmitStrategy::Sequential, &submitter, &cancel),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        }
    );
    let report = report.unwrap();

    assert!(report
        .pages
        .iter()
        .all(|p| matches!(p.status, PageStatus::Cancelled)));
    assert_eq!(camera.live_streams(), 0);
}
