// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::emit_json;
use super::imaging::read_upload;
use crate::camera::{CameraConstraints, CameraDevice, SyntheticCamera};
use crate::capture::{
    BatchOrchestrator, CaptureInput, CaptureKind, CaptureStateMachine, ScannerPreset,
    SessionPageSubmitter, SubmitStrategy,
};
use crate::config::CaptureConfig;
use crate::recognition::{GateConfig, RecognitionClient};
use crate::vision::{FrameSource, ImagePreprocessor};

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image file to upload; captures from the synthetic camera when omitted
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Scanner preset (vin, odometer, license-plate, document, generic)
    #[arg(long, default_value = "generic")]
    pub preset: String,

    /// Override the preset's confidence threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Synthetic camera frame size, WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    pub camera_size: (u32, u32),

    /// Write the JSON report here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Page images, in page order
    #[arg(required = true)]
    pub pages: Vec<PathBuf>,

    /// Capture kind for every page
    #[arg(long, default_value = "document")]
    pub kind: CaptureKind,

    /// Submit up to N pages concurrently instead of one at a time
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Write the JSON report here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub(crate) fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid dimension '{}'", v))
    };
    Ok((parse(w)?, parse(h)?))
}

pub async fn scan(args: ScanArgs, config: &CaptureConfig) -> Result<()> {
    let preset = ScannerPreset::by_name(&args.preset)
        .ok_or_else(|| anyhow!("Unknown preset '{}'", args.preset))?;
    let client = Arc::new(RecognitionClient::from_config(&config.recognition)?);
    let (width, height) = args.camera_size;
    let device: Arc<dyn CameraDevice> = Arc::new(SyntheticCamera::new(width, height));

    let mut machine = CaptureStateMachine::from_config(preset.kind, device, client, config)
        .with_preset(&preset)?;
    if let Some(threshold) = args.threshold {
        machine = machine.with_gate(GateConfig {
            threshold,
            max_retries: config.gate.max_retries,
        });
    }

    let input = match &args.file {
        Some(path) => CaptureInput::Upload(read_upload(path).await?),
        None => CaptureInput::Camera(CameraConstraints::default()),
    };

    let cancel = machine.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling capture");
            cancel.cancel();
        }
    });
    let outcome = machine.run(input).await;
    ctrl_c.abort();

    match outcome {
        Ok(report) => {
            info!(
                session_id = %report.session.id,
                state = %report.state(),
                attempts = report.session.attempts,
                "Scan finished"
            );
            emit_json(&report, args.output.as_deref()).await
        }
        Err(e) => {
            let report = machine.report();
            if let Some(reason) = &report.failure {
                error!(code = %reason.code, "{}", reason.remediation);
            }
            emit_json(&report, args.output.as_deref()).await?;
            Err(e.into())
        }
    }
}

pub async fn batch(args: BatchArgs, config: &CaptureConfig) -> Result<()> {
    let strategy = match args.parallel {
        Some(n) => SubmitStrategy::ParallelBounded(n),
        None => SubmitStrategy::Sequential,
    };
    let preset = ScannerPreset::for_kind(args.kind);
    let options = preset.normalize_options(&config.normalize);
    let preprocessor = ImagePreprocessor::new();

    let mut orchestrator = BatchOrchestrator::from_config(args.kind, &config.batch);
    for path in &args.pages {
        let frame = read_upload(path).await?;
        let image = preprocessor.normalize(frame, &options).await?;
        orchestrator.add_page(image, FrameSource::Upload)?;
    }

    // Pages are uploads; the device is only there to satisfy the session
    let client = Arc::new(RecognitionClient::from_config(&config.recognition)?);
    let device: Arc<dyn CameraDevice> = Arc::new(SyntheticCamera::new(640, 480));
    let submitter = SessionPageSubmitter::from_config(client, device, config);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling batch");
            watcher.cancel();
        }
    });
    let report = orchestrator.submit_all(strategy, &submitter, &cancel).await;
    ctrl_c.abort();
    let report = report?;

    emit_json(&report, args.output.as_deref()).await?;
    if report.all_succeeded() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} pages failed",
            report.pages.len() - report.succeeded(),
            report.pages.len()
        ))
    }
}
