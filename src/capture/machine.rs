// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capture state machine
//!
//! Drives one session from input selection to a terminal state. Each step
//! method validates its transition up front, performs the phase work, then
//! applies the transition's effects (hooks, camera release, attempt
//! bookkeeping). Any failure moves the session to `error` with a structured
//! `FailureReason`; the camera is released on every exit path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::{FailureReason, PipelineError};
use super::events::{AnalyticsEvent, AnalyticsEventKind, EventSink, TracingEventSink};
use super::presets::ScannerPreset;
use super::session::{CaptureKind, CaptureSession};
use super::state::{transition, CaptureEvent, CaptureState, Effect, InvalidTransition, Transition};
use crate::camera::{CameraConstraints, CameraController, CameraDevice, CaptureError, StreamHandle};
use crate::config::CaptureConfig;
use crate::plugins::{
    HookError, HookName, PluginContext, PluginDescriptor, PluginError, PluginRuntime,
    ValidationError,
};
use crate::recognition::{
    ConfidenceGate, GateConfig, GateDecision, NetworkError, RecognitionClient, RecognitionResult,
    SubmitOptions,
};
use crate::vision::image_utils::validate_input;
use crate::vision::{ImagePreprocessor, NormalizeOptions, NormalizedImage, RawFrame};

/// Where a session's image comes from
#[derive(Debug, Clone)]
pub enum CaptureInput {
    Camera(CameraConstraints),
    Upload(RawFrame),
    /// Image normalized ahead of time (batch pages); skips the preprocessor
    Normalized(Arc<NormalizedImage>),
}

/// Facts about the submitted image, for reports
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    pub format: &'static str,
    pub byte_size: usize,
    pub original_byte_size: usize,
    pub compression_ratio: f64,
    pub rotated: bool,
    pub orientation_applied: u8,
}

impl From<&NormalizedImage> for ImageSummary {
    fn from(image: &NormalizedImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format: image.format().mime_type(),
            byte_size: image.byte_size(),
            original_byte_size: image.original_byte_size(),
            compression_ratio: image.compression_ratio(),
            rotated: image.rotated(),
            orientation_applied: image.orientation_applied().exif_value(),
        }
    }
}

/// Snapshot of a session handed back to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub session: CaptureSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RecognitionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSummary>,
}

impl CaptureReport {
    pub fn state(&self) -> CaptureState {
        self.session.state
    }

    pub fn is_success(&self) -> bool {
        self.session.state == CaptureState::Success
    }
}

pub struct CaptureStateMachine {
    session: CaptureSession,
    camera: CameraController,
    constraints: CameraConstraints,
    preprocessor: ImagePreprocessor,
    normalize_options: NormalizeOptions,
    client: Arc<RecognitionClient>,
    gate: ConfidenceGate,
    plugins: PluginRuntime,
    ctx: PluginContext,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    retry_on_validation_failure: bool,
    /// Frame awaiting normalization
    pending: Option<RawFrame>,
    /// Uploaded frame, kept for re-normalization on retry
    upload: Option<RawFrame>,
    /// Pre-normalized input, reused as is on every attempt
    prepared: Option<Arc<NormalizedImage>>,
    image: Option<Arc<NormalizedImage>>,
    result: Option<RecognitionResult>,
    rejected: Option<ValidationError>,
    failure: Option<FailureReason>,
    finished_at: Option<DateTime<Utc>>,
    attempt_started: Option<Instant>,
}

impl std::fmt::Debug for CaptureStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStateMachine")
            .field("session", &self.session)
            .field("camera", &self.camera)
            .field("plugins", &self.plugins.plugin_ids())
            .field("transport", &self.client.transport_name())
            .finish()
    }
}

impl CaptureStateMachine {
    pub fn new(
        kind: CaptureKind,
        device: Arc<dyn CameraDevice>,
        client: Arc<RecognitionClient>,
    ) -> Self {
        let session = CaptureSession::new(kind);
        let ctx = PluginContext::new(session.id.clone(), kind);
        Self {
            session,
            camera: CameraController::new(device),
            constraints: CameraConstraints::default(),
            preprocessor: ImagePreprocessor::new(),
            normalize_options: NormalizeOptions::default(),
            client,
            gate: ConfidenceGate::default(),
            plugins: PluginRuntime::new(),
            ctx,
            events: Arc::new(TracingEventSink),
            cancel: CancellationToken::new(),
            retry_on_validation_failure: false,
            pending: None,
            upload: None,
            prepared: None,
            image: None,
            result: None,
            rejected: None,
            failure: None,
            finished_at: None,
            attempt_started: None,
        }
    }

    /// Machine configured from `config` (gate, normalize options, validation retry)
    pub fn from_config(
        kind: CaptureKind,
        device: Arc<dyn CameraDevice>,
        client: Arc<RecognitionClient>,
        config: &CaptureConfig,
    ) -> Self {
        Self::new(kind, device, client)
            .with_gate(config.gate.clone())
            .with_normalize_options(config.normalize.clone())
            .with_retry_on_validation_failure(config.retry_on_validation_failure)
    }

    /// Apply a scanner preset: kind, threshold, frame guide metadata,
    /// normalize overrides and default plugins
    pub fn with_preset(mut self, preset: &ScannerPreset) -> Result<Self, PipelineError> {
        self.session.capture_kind = preset.kind;
        self.ctx.capture_kind = preset.kind;
        self.gate = ConfidenceGate::new(GateConfig {
            threshold: preset.threshold,
            max_retries: self.gate.max_retries(),
        });
        self.normalize_options = preset.normalize_options(&self.normalize_options);
        if let serde_json::Value::Object(entries) = preset.metadata() {
            self.ctx.metadata.extend(entries);
        }
        for plugin in preset.default_plugins() {
            self.plugins.register(plugin)?;
        }
        Ok(self)
    }

    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = ConfidenceGate::new(gate);
        self
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize_options = options;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Cancel through `token`, e.g. a child of a batch-wide token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Add an entry to the metadata sent with each recognition request
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.ctx.set_metadata(key, value);
        self
    }

    pub fn with_constraints(mut self, constraints: CameraConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Let validation rejections consume the attempt budget instead of
    /// failing the session outright
    pub fn with_retry_on_validation_failure(mut self, enabled: bool) -> Self {
        self.retry_on_validation_failure = enabled;
        self
    }

    pub fn register_plugin(&mut self, descriptor: PluginDescriptor) -> Result<(), PipelineError> {
        self.plugins.register(descriptor)?;
        Ok(())
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn state(&self) -> CaptureState {
        self.session.state
    }

    pub fn attempts(&self) -> u32 {
        self.session.attempts
    }

    pub fn result(&self) -> Option<&RecognitionResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn image(&self) -> Option<&Arc<NormalizedImage>> {
        self.image.as_ref()
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    pub fn plugins(&self) -> &PluginRuntime {
        &self.plugins
    }

    /// Camera streams still open (0 once the session is terminal)
    pub fn open_camera_streams(&self) -> usize {
        self.camera.open_stream_count()
    }

    /// Token another task can use to cancel this session
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn report(&self) -> CaptureReport {
        CaptureReport {
            session: self.session.clone(),
            finished_at: self.finished_at,
            result: self.result.clone(),
            failure: self.failure.clone(),
            image: self.image.as_deref().map(ImageSummary::from),
        }
    }

    /// Consume the machine, releasing the camera and plugins
    pub fn into_report(self) -> CaptureReport {
        self.report()
    }

    /// Drive a whole session from `input` to a terminal state
    ///
    /// Low-confidence results are recaptured automatically (camera input) or
    /// re-normalized (upload input) until the gate accepts or the attempt
    /// budget runs out. Cancellation yields `Ok` with a `cancelled` report.
    pub async fn run(&mut self, input: CaptureInput) -> Result<CaptureReport, PipelineError> {
        info!(
            session_id = %self.session.id,
            capture_kind = %self.session.capture_kind,
            transport = self.client.transport_name(),
            "Capture session started"
        );
        match self.drive(input).await {
            Ok(()) | Err(PipelineError::Cancelled) => Ok(self.report()),
            Err(e) => Err(e),
        }
    }

    async fn drive(&mut self, input: CaptureInput) -> Result<(), PipelineError> {
        match input {
            CaptureInput::Camera(constraints) => {
                self.constraints = constraints;
                self.start_camera().await?;
            }
            CaptureInput::Upload(frame) => self.upload_file(frame).await?,
            CaptureInput::Normalized(image) => self.upload_normalized(image).await?,
        }

        loop {
            match self.session.state {
                CaptureState::CameraActive => self.capture().await?,
                CaptureState::Preprocessing => {
                    self.normalize().await?;
                    self.submit().await?;
                    self.check_confidence().await?;
                }
                CaptureState::Success => return Ok(()),
                CaptureState::Cancelled => return Err(PipelineError::Cancelled),
                state => {
                    return Err(InvalidTransition {
                        state,
                        event: CaptureEvent::Capture,
                    }
                    .into())
                }
            }
        }
    }

    /// `selecting-input --start-camera--> camera-active`
    pub async fn start_camera(&mut self) -> Result<StreamHandle, PipelineError> {
        let t = self.check(CaptureEvent::StartCamera)?;
        self.bail_if_cancelled().await?;

        let token = self.cancel.clone();
        let acquired = tokio::select! {
            _ = token.cancelled() => None,
            r = self.camera.acquire(&self.constraints) => Some(r),
        };
        let handle = match acquired {
            None => return Err(self.enter_cancelled().await),
            Some(Ok(handle)) => handle,
            Some(Err(e)) => return Err(self.fail(e.into()).await),
        };

        self.advance(t).await?;
        self.emit(self.event(AnalyticsEventKind::CameraStarted));
        Ok(handle)
    }

    /// `camera-active --capture--> preprocessing`
    pub async fn capture(&mut self) -> Result<(), PipelineError> {
        let t = self.check(CaptureEvent::Capture)?;
        self.bail_if_cancelled().await?;
        self.attempt_started = Some(Instant::now());
        self.emit(self.event(AnalyticsEventKind::CaptureInitiated));

        if let Err(e) = self.plugins.run_lifecycle(HookName::BeforeCapture, &mut self.ctx).await {
            return Err(self.fail(e.into()).await);
        }
        let frame = match self.camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        self.pending = Some(frame);
        if let Err(e) = self.plugins.run_lifecycle(HookName::AfterCapture, &mut self.ctx).await {
            return Err(self.fail(e.into()).await);
        }

        self.bail_if_cancelled().await?;
        self.emit(self.event(AnalyticsEventKind::CaptureSuccess));
        self.advance(t).await
    }

    /// `selecting-input --upload-file--> preprocessing`
    ///
    /// Files failing MIME or size validation never reach the preprocessor.
    pub async fn upload_file(&mut self, frame: RawFrame) -> Result<(), PipelineError> {
        let t = self.check(CaptureEvent::UploadFile)?;
        self.bail_if_cancelled().await?;
        self.attempt_started = Some(Instant::now());
        self.emit(self.event(AnalyticsEventKind::CaptureInitiated));

        if let Err(e) = validate_input(
            frame.mime_type(),
            frame.byte_size(),
            self.normalize_options.max_input_bytes,
        ) {
            return Err(self.fail(e.into()).await);
        }
        self.upload = Some(frame.clone());
        self.pending = Some(frame);

        self.emit(self.event(AnalyticsEventKind::CaptureSuccess));
        self.advance(t).await
    }

    /// `selecting-input --upload-file--> preprocessing` for an image that is
    /// already normalized; the preprocessing phase passes it through
    pub async fn upload_normalized(
        &mut self,
        image: Arc<NormalizedImage>,
    ) -> Result<(), PipelineError> {
        let t = self.check(CaptureEvent::UploadFile)?;
        self.bail_if_cancelled().await?;
        self.attempt_started = Some(Instant::now());
        self.emit(self.event(AnalyticsEventKind::CaptureInitiated));

        self.prepared = Some(image);
        self.emit(self.event(AnalyticsEventKind::CaptureSuccess));
        self.advance(t).await
    }

    /// `preprocessing --normalized--> submitting`
    pub async fn normalize(&mut self) -> Result<Arc<NormalizedImage>, PipelineError> {
        let t = self.check(CaptureEvent::Normalized)?;
        self.bail_if_cancelled().await?;

        let image = match self.prepared.clone() {
            Some(image) => {
                if self.attempt_started.is_none() {
                    self.attempt_started = Some(Instant::now());
                }
                self.emit(self.event(AnalyticsEventKind::ProcessingStarted));
                image
            }
            None => self.normalize_pending().await?,
        };

        self.ctx.image = Some(image.clone());
        self.image = Some(image.clone());
        self.advance(t).await?;
        Ok(image)
    }

    async fn normalize_pending(&mut self) -> Result<Arc<NormalizedImage>, PipelineError> {
        let Some(frame) = self.pending.take().or_else(|| self.upload.clone()) else {
            return Err(self.fail(CaptureError::NoActiveStream.into()).await);
        };
        if self.attempt_started.is_none() {
            self.attempt_started = Some(Instant::now());
        }
        self.emit(self.event(AnalyticsEventKind::ProcessingStarted));

        let started = Instant::now();
        let token = self.cancel.clone();
        let normalized = tokio::select! {
            _ = token.cancelled() => None,
            r = self.preprocessor.normalize(frame, &self.normalize_options) => Some(r),
        };
        let image = match normalized {
            None => return Err(self.enter_cancelled().await),
            Some(Err(e)) => return Err(self.fail(e.into()).await),
            Some(Ok(image)) => Arc::new(image),
        };
        debug!(
            session_id = %self.session.id,
            attempt = self.session.attempts,
            width = image.width(),
            height = image.height(),
            bytes = image.byte_size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Frame normalized"
        );
        Ok(image)
    }

    /// `submitting --responded--> confidence-check`
    ///
    /// Submits the image, then runs `transform-result`, `enrich-result` and
    /// `validate-result` hooks over the payload.
    pub async fn submit(&mut self) -> Result<RecognitionResult, PipelineError> {
        let t = self.check(CaptureEvent::Responded)?;
        self.bail_if_cancelled().await?;

        let Some(image) = self.image.clone() else {
            return Err(self.fail(CaptureError::NoActiveStream.into()).await);
        };
        let options = SubmitOptions {
            metadata: self.ctx.metadata_value(),
        };
        let client = self.client.clone();
        let token = self.cancel.clone();
        let result = match client
            .submit(&image, self.session.capture_kind, &options, &token)
            .await
        {
            Ok(result) => result,
            Err(NetworkError::Cancelled) => return Err(self.enter_cancelled().await),
            Err(e) => return Err(self.fail(e.into()).await),
        };

        self.ctx.result = Some(result.clone());
        let data = match self.run_result_hooks(result.data.clone()).await {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        let result = RecognitionResult { data, ..result };
        self.ctx.result = Some(result.clone());
        self.result = Some(result.clone());

        match self.plugins.run_validate(&result.data, &mut self.ctx).await {
            Ok(()) => self.rejected = None,
            Err(HookError::Validation(v)) if self.retry_on_validation_failure => {
                info!(
                    session_id = %self.session.id,
                    plugin_id = %v.plugin_id,
                    "Result rejected by validator, counting as a failed attempt"
                );
                self.rejected = Some(v);
            }
            Err(e) => return Err(self.fail(e.into()).await),
        }

        self.advance(t).await?;
        Ok(result)
    }

    /// Resolve `confidence-check` into success, recapture or failure
    pub async fn check_confidence(&mut self) -> Result<CaptureState, PipelineError> {
        self.check(CaptureEvent::Accept)?;
        self.bail_if_cancelled().await?;

        let Some(confidence) = self.result.as_ref().map(|r| r.confidence) else {
            return Err(self.fail(CaptureError::NoActiveStream.into()).await);
        };
        let attempts = self.session.attempts;
        let rejected = self.rejected.take();
        let decision = match rejected {
            Some(_) => self.gate.after_rejection(attempts),
            None => self.gate.evaluate(confidence, attempts),
        };
        debug!(
            session_id = %self.session.id,
            confidence,
            threshold = self.gate.threshold(),
            attempts,
            decision = ?decision,
            "Confidence gate evaluated"
        );

        match decision {
            GateDecision::Accept => {
                let t = self.check(CaptureEvent::Accept)?;
                self.advance(t).await?;
                let mut event = self
                    .event(AnalyticsEventKind::ProcessingSuccess)
                    .with_confidence(confidence);
                if let Some(started) = self.attempt_started {
                    event = event.with_duration_ms(started.elapsed().as_millis() as u64);
                }
                self.emit(event);
                info!(
                    session_id = %self.session.id,
                    confidence,
                    attempts,
                    "Capture succeeded"
                );
            }
            GateDecision::Retry => {
                let from_camera = self.upload.is_none() && self.prepared.is_none();
                let t = self.check(CaptureEvent::Recapture { from_camera })?;
                info!(
                    session_id = %self.session.id,
                    confidence,
                    threshold = self.gate.threshold(),
                    "Attempt {}/{} rejected, retrying",
                    attempts,
                    self.gate.max_retries()
                );
                self.advance(t).await?;
                self.ctx.reset_attempt();
                self.image = None;
                self.attempt_started = None;
                self.emit(
                    self.event(AnalyticsEventKind::RetryAttempted)
                        .with_confidence(confidence),
                );
            }
            GateDecision::Exhausted => {
                let error = match rejected {
                    Some(v) => PipelineError::Validation(v),
                    None => PipelineError::LowConfidence {
                        confidence,
                        threshold: self.gate.threshold(),
                        attempts,
                    },
                };
                return Err(self.fail(error).await);
            }
        }
        Ok(self.session.state)
    }

    /// Cancel from any non-terminal state; a no-op once cancelled
    pub async fn cancel(&mut self) -> Result<(), PipelineError> {
        match self.session.state {
            CaptureState::Cancelled => Ok(()),
            state if state.is_terminal() => Err(InvalidTransition {
                state,
                event: CaptureEvent::Cancel,
            }
            .into()),
            _ => {
                self.enter_cancelled().await;
                Ok(())
            }
        }
    }

    /// `error --retry--> selecting-input`, resetting attempts
    pub async fn retry(&mut self) -> Result<(), PipelineError> {
        let t = self.check(CaptureEvent::Retry)?;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.pending = None;
        self.upload = None;
        self.prepared = None;
        self.image = None;
        self.result = None;
        self.rejected = None;
        self.failure = None;
        self.finished_at = None;
        self.attempt_started = None;
        self.ctx.reset_attempt();

        self.advance(t).await?;
        self.emit(self.event(AnalyticsEventKind::RetryAttempted));
        info!(session_id = %self.session.id, "Capture session reset for retry");
        Ok(())
    }

    async fn run_result_hooks(
        &mut self,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        let data = self
            .plugins
            .run_result(HookName::TransformResult, data, &mut self.ctx)
            .await?;
        self.plugins
            .run_result(HookName::EnrichResult, data, &mut self.ctx)
            .await
    }

    fn check(&self, event: CaptureEvent) -> Result<Transition, PipelineError> {
        Ok(transition(self.session.state, event)?)
    }

    /// Apply `t`, failing the session if one of its hooks fails
    async fn advance(&mut self, t: Transition) -> Result<(), PipelineError> {
        match self.apply(t).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    async fn apply(&mut self, t: Transition) -> Result<(), PluginError> {
        for effect in t.effects {
            match *effect {
                Effect::RunHook(HookName::OnError) => {
                    let reason = self
                        .failure
                        .clone()
                        .unwrap_or_else(|| FailureReason::new("unknown", "capture failed"));
                    self.plugins.run_on_error(reason, &mut self.ctx).await;
                }
                Effect::RunHook(hook) => self.plugins.run_lifecycle(hook, &mut self.ctx).await?,
                Effect::ReleaseCamera => self.camera.release(),
                Effect::BeginAttempt => self.session.attempts = 1,
                Effect::IncrementAttempts => self.session.attempts += 1,
                Effect::ResetAttempts => self.session.attempts = 0,
            }
        }
        self.ctx.attempt = self.session.attempts;
        debug!(
            session_id = %self.session.id,
            from = %t.from,
            to = %t.to,
            attempts = self.session.attempts,
            "Capture state transition"
        );
        self.session.state = t.to;
        if t.to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Move to `error`, recording the reason; returns `error` for propagation
    async fn fail(&mut self, error: PipelineError) -> PipelineError {
        let reason = error.reason(self.session.capture_kind);
        error!(
            session_id = %self.session.id,
            state = %self.session.state,
            code = %reason.code,
            attempts = self.session.attempts,
            "Capture failed: {}",
            error
        );

        let kind = match self.session.state {
            CaptureState::SelectingInput | CaptureState::CameraActive => {
                AnalyticsEventKind::CaptureFailed
            }
            _ => AnalyticsEventKind::ProcessingFailed,
        };
        let mut event = self.event(kind).with_error_code(reason.code.clone());
        if let Some(started) = self.attempt_started {
            event = event.with_duration_ms(started.elapsed().as_millis() as u64);
        }
        self.emit(event);
        self.failure = Some(reason);

        let notify = !error.on_error_ran();
        match transition(self.session.state, CaptureEvent::Fail { notify }) {
            Ok(t) => {
                if let Err(e) = self.apply(t).await {
                    warn!(session_id = %self.session.id, "Failure transition hook failed: {}", e);
                    self.camera.release();
                }
            }
            Err(e) => {
                warn!(session_id = %self.session.id, "{}", e);
                self.camera.release();
            }
        }
        error
    }

    /// Move to `cancelled`; the camera is released even if `on-cancel` fails
    async fn enter_cancelled(&mut self) -> PipelineError {
        self.cancel.cancel();
        match transition(self.session.state, CaptureEvent::Cancel) {
            Ok(t) => {
                info!(session_id = %self.session.id, state = %self.session.state, "Capture cancelled");
                self.emit(self.event(AnalyticsEventKind::UserCancelled));
                if let Err(e) = self.apply(t).await {
                    warn!(session_id = %self.session.id, "Cancel transition hook failed: {}", e);
                }
            }
            Err(e) => debug!(session_id = %self.session.id, "{}", e),
        }
        self.camera.release();
        PipelineError::Cancelled
    }

    async fn bail_if_cancelled(&mut self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(self.enter_cancelled().await)
        } else {
            Ok(())
        }
    }

    fn event(&self, kind: AnalyticsEventKind) -> AnalyticsEvent {
        AnalyticsEvent::new(
            kind,
            &self.session.id,
            self.session.capture_kind,
            self.session.attempts,
        )
    }

    fn emit(&self, event: AnalyticsEvent) {
        self.events.emit(event);
    }
}
