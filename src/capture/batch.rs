// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-page batches
//!
//! A `BatchOrchestrator` holds an ordered list of normalized pages. Pages can
//! be added, removed and reordered until `submit_all`, which freezes the list
//! and submits every page either one at a time or with bounded concurrency.
//! Each page runs as its own capture session (see `SessionPageSubmitter`).

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{FailureReason, PipelineError};
use super::events::{EventSink, TracingEventSink};
use super::machine::{CaptureInput, CaptureStateMachine};
use super::presets::ScannerPreset;
use super::session::CaptureKind;
use crate::camera::CameraDevice;
use crate::config::CaptureConfig;
use crate::plugins::PluginDescriptor;
use crate::recognition::{GateConfig, RecognitionClient, RecognitionResult};
use crate::vision::{FrameSource, NormalizedImage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Batch is full ({max} pages)")]
    Capacity { max: usize },

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Page index {index} out of range for {len} pages")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Batch has already been submitted")]
    Frozen,

    #[error("Batch has no pages")]
    Empty,

    #[error("Parallelism must be at least 1")]
    InvalidParallelism,
}

impl BatchError {
    pub fn code(&self) -> &'static str {
        match self {
            BatchError::Capacity { .. } => "capacity",
            BatchError::PageNotFound(_) => "page-not-found",
            BatchError::IndexOutOfRange { .. } => "index-out-of-range",
            BatchError::Frozen => "batch-frozen",
            BatchError::Empty => "batch-empty",
            BatchError::InvalidParallelism => "invalid-parallelism",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_pages: usize,
    /// Concurrency used by `parallel-bounded` submission
    pub parallelism: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_pages: 20,
            parallelism: 3,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pages == 0 {
            return Err("max_pages must be at least 1".to_string());
        }
        if self.parallelism == 0 {
            return Err("parallelism must be at least 1".to_string());
        }
        Ok(())
    }
}

/// How `submit_all` schedules page submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitStrategy {
    /// One page at a time, yielding to the runtime between pages
    #[default]
    Sequential,
    /// Up to N pages in flight
    ParallelBounded(usize),
}

#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub id: String,
    /// 1-based, contiguous
    pub page_number: u32,
    pub image: Arc<NormalizedImage>,
    pub source: FrameSource,
}

/// Submits a single page; `SessionPageSubmitter` is the production implementation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSubmitter: Send + Sync {
    async fn submit_page(
        &self,
        page: &CapturedPage,
        kind: CaptureKind,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, PipelineError>;
}

/// Runs each page through its own `CaptureStateMachine` over the upload path
///
/// Every page session gets the kind's scanner preset plus the plugins
/// registered here, and retries low confidence on its own attempt budget.
/// Pages never open the camera.
pub struct SessionPageSubmitter {
    client: Arc<RecognitionClient>,
    device: Arc<dyn CameraDevice>,
    gate: GateConfig,
    gate_override: bool,
    retry_on_validation_failure: bool,
    plugins: Vec<PluginDescriptor>,
    events: Arc<dyn EventSink>,
}

impl SessionPageSubmitter {
    pub fn new(client: Arc<RecognitionClient>, device: Arc<dyn CameraDevice>) -> Self {
        Self {
            client,
            device,
            gate: GateConfig::default(),
            gate_override: false,
            retry_on_validation_failure: false,
            plugins: Vec::new(),
            events: Arc::new(TracingEventSink),
        }
    }

    /// Attempt budget and validation retry from `config`; thresholds still
    /// come from each kind's preset
    pub fn from_config(
        client: Arc<RecognitionClient>,
        device: Arc<dyn CameraDevice>,
        config: &CaptureConfig,
    ) -> Self {
        let mut submitter = Self::new(client, device);
        submitter.gate = config.gate.clone();
        submitter.retry_on_validation_failure = config.retry_on_validation_failure;
        submitter
    }

    /// Gate every page with `gate`, replacing the preset threshold
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self.gate_override = true;
        self
    }

    pub fn with_retry_on_validation_failure(mut self, enabled: bool) -> Self {
        self.retry_on_validation_failure = enabled;
        self
    }

    /// Register `descriptor` on every page session, after the preset plugins
    pub fn with_plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.push(descriptor);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn session_for(
        &self,
        page: &CapturedPage,
        kind: CaptureKind,
        cancel: &CancellationToken,
    ) -> Result<CaptureStateMachine, PipelineError> {
        let mut machine =
            CaptureStateMachine::new(kind, self.device.clone(), self.client.clone())
                .with_gate(self.gate.clone())
                .with_retry_on_validation_failure(self.retry_on_validation_failure)
                .with_event_sink(self.events.clone())
                .with_cancel_token(cancel.child_token())
                .with_preset(&ScannerPreset::for_kind(kind))?
                .with_metadata("pageId", json!(page.id))
                .with_metadata("pageNumber", json!(page.page_number));
        if self.gate_override {
            machine = machine.with_gate(self.gate.clone());
        }
        for plugin in &self.plugins {
            machine.register_plugin(plugin.clone())?;
        }
        Ok(machine)
    }
}

#[async_trait]
impl PageSubmitter for SessionPageSubmitter {
    async fn submit_page(
        &self,
        page: &CapturedPage,
        kind: CaptureKind,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult, PipelineError> {
        let mut machine = self.session_for(page, kind, cancel)?;
        let report = machine
            .run(CaptureInput::Normalized(page.image.clone()))
            .await?;
        debug!(
            page_id = %page.id,
            page_number = page.page_number,
            session_id = %report.session.id,
            attempts = report.session.attempts,
            state = %report.state(),
            "Page session finished"
        );
        let succeeded = report.is_success();
        match report.result {
            Some(result) if succeeded => Ok(result),
            // `run` only returns a non-success report once cancelled
            _ => Err(PipelineError::Cancelled),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum PageStatus {
    Succeeded { result: RecognitionResult },
    Failed { reason: FailureReason },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    pub page_id: String,
    pub page_number: u32,
    #[serde(flatten)]
    pub status: PageStatus,
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PageStatus::Succeeded { .. })
    }
}

/// Per-page outcomes in page order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub capture_kind: CaptureKind,
    pub pages: Vec<PageOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.pages.iter().filter(|p| p.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Failed { .. }))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.pages.len()
    }
}

#[derive(Debug)]
pub struct BatchOrchestrator {
    id: String,
    capture_kind: CaptureKind,
    max_pages: usize,
    pages: Vec<CapturedPage>,
    frozen: bool,
}

impl BatchOrchestrator {
    pub fn new(capture_kind: CaptureKind, max_pages: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            capture_kind,
            max_pages,
            pages: Vec::new(),
            frozen: false,
        }
    }

    pub fn from_config(capture_kind: CaptureKind, config: &BatchConfig) -> Self {
        Self::new(capture_kind, config.max_pages)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capture_kind(&self) -> CaptureKind {
        self.capture_kind
    }

    pub fn pages(&self) -> &[CapturedPage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_pages.saturating_sub(self.pages.len())
    }

    /// Append a page, numbering it after the last one
    pub fn add_page(
        &mut self,
        image: impl Into<Arc<NormalizedImage>>,
        source: FrameSource,
    ) -> Result<&CapturedPage, BatchError> {
        self.ensure_open()?;
        if self.pages.len() >= self.max_pages {
            return Err(BatchError::Capacity {
                max: self.max_pages,
            });
        }
        let page = CapturedPage {
            id: Uuid::new_v4().to_string(),
            page_number: self.pages.len() as u32 + 1,
            image: image.into(),
            source,
        };
        debug!(batch_id = %self.id, page_id = %page.id, page_number = page.page_number, "Page added");
        self.pages.push(page);
        let index = self.pages.len() - 1;
        Ok(&self.pages[index])
    }

    pub fn remove_page(&mut self, id: &str) -> Result<CapturedPage, BatchError> {
        self.ensure_open()?;
        let index = self
            .pages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| BatchError::PageNotFound(id.to_string()))?;
        let page = self.pages.remove(index);
        self.renumber();
        debug!(batch_id = %self.id, page_id = %page.id, remaining = self.pages.len(), "Page removed");
        Ok(page)
    }

    /// Move the page at `from` to `to` (0-based) and renumber
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), BatchError> {
        self.ensure_open()?;
        let len = self.pages.len();
        for index in [from, to] {
            if index >= len {
                return Err(BatchError::IndexOutOfRange { index, len });
            }
        }
        let page = self.pages.remove(from);
        self.pages.insert(to, page);
        self.renumber();
        Ok(())
    }

    /// Submit every page and freeze the batch
    ///
    /// Page failures are recorded in the report rather than aborting the
    /// batch. Once `cancel` fires, pages not yet started are reported as
    /// cancelled.
    pub async fn submit_all(
        &mut self,
        strategy: SubmitStrategy,
        submitter: &dyn PageSubmitter,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        self.ensure_open()?;
        if self.pages.is_empty() {
            return Err(BatchError::Empty);
        }
        if strategy == SubmitStrategy::ParallelBounded(0) {
            return Err(BatchError::InvalidParallelism);
        }
        self.frozen = true;

        info!(
            batch_id = %self.id,
            pages = self.pages.len(),
            strategy = ?strategy,
            "Submitting batch"
        );
        let started = Instant::now();
        let kind = self.capture_kind;

        let pages = match strategy {
            SubmitStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(self.pages.len());
                for page in &self.pages {
                    outcomes.push(submit_one(page, kind, submitter, cancel).await);
                    tokio::task::yield_now().await;
                }
                outcomes
            }
            SubmitStrategy::ParallelBounded(limit) => {
                stream::iter(self.pages.iter())
                    .map(|page| submit_one(page, kind, submitter, cancel))
                    .buffered(limit)
                    .collect()
                    .await
            }
        };

        let report = BatchReport {
            batch_id: self.id.clone(),
            capture_kind: kind,
            pages,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            batch_id = %report.batch_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Batch submitted"
        );
        Ok(report)
    }

    fn ensure_open(&self) -> Result<(), BatchError> {
        if self.frozen {
            Err(BatchError::Frozen)
        } else {
            Ok(())
        }
    }

    fn renumber(&mut self) {
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.page_number = i as u32 + 1;
        }
    }
}

async fn submit_one(
    page: &CapturedPage,
    kind: CaptureKind,
    submitter: &dyn PageSubmitter,
    cancel: &CancellationToken,
) -> PageOutcome {
    let status = if cancel.is_cancelled() {
        PageStatus::Cancelled
    } else {
        match submitter.submit_page(page, kind, cancel).await {
            Ok(result) => PageStatus::Succeeded { result },
            Err(PipelineError::Cancelled) => PageStatus::Cancelled,
            Err(e) => {
                warn!(page_id = %page.id, page_number = page.page_number, "Page submission failed: {}", e);
                PageStatus::Failed {
                    reason: e.reason(kind),
                }
            }
        }
    };
    PageOutcome {
        page_id: page.id.clone(),
        page_number: page.page_number,
        status,
    }
}
