// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use super::emit_json;
use crate::capture::ImageSummary;
use crate::config::CaptureConfig;
use crate::vision::{ImagePreprocessor, NormalizeOptions, OutputFormat, RawFrame};

/// Arguments shared by the normalize and compress commands
#[derive(Args, Debug, Clone)]
pub struct ImageOptionArgs {
    /// Maximum output width in pixels
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Encoder quality (0-1)
    #[arg(long)]
    pub quality: Option<f32>,

    /// Output format (jpeg, png, webp)
    #[arg(long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Keep pixels as stored, ignoring the EXIF orientation tag
    #[arg(long)]
    pub no_auto_rotate: bool,

    /// Carry the source EXIF segment over to JPEG output
    #[arg(long)]
    pub keep_metadata: bool,
}

impl ImageOptionArgs {
    /// `base` with the flags given on the command line applied
    pub fn apply(&self, base: &NormalizeOptions) -> Result<NormalizeOptions> {
        let mut options = base.clone();
        if let Some(w) = self.max_width {
            options.max_width = w;
        }
        if let Some(h) = self.max_height {
            options.max_height = h;
        }
        if let Some(q) = self.quality {
            options.quality = q;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if self.no_auto_rotate {
            options.auto_rotate = false;
        }
        if self.keep_metadata {
            options.strip_metadata = false;
        }
        options.validate()?;
        Ok(options)
    }
}

/// Arguments for the normalize command
#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Source image
    pub input: PathBuf,

    /// Where to write the normalized image
    #[arg(long, short)]
    pub output: PathBuf,

    #[command(flatten)]
    pub image: ImageOptionArgs,
}

/// Arguments for the compress command
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Source image
    pub input: PathBuf,

    /// Where to write the compressed image
    #[arg(long, short)]
    pub output: PathBuf,

    /// Byte budget for the output
    #[arg(long)]
    pub target_bytes: usize,

    #[command(flatten)]
    pub image: ImageOptionArgs,
}

pub(crate) fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s).ok_or_else(|| format!("unsupported format '{}'", s))
}

pub(crate) async fn read_upload(path: &Path) -> Result<RawFrame> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("{} is empty", path.display()));
    }
    Ok(RawFrame::from_upload_sniffed(bytes))
}

pub async fn normalize(args: NormalizeArgs, config: &CaptureConfig) -> Result<()> {
    let options = args.image.apply(&config.normalize)?;
    let frame = read_upload(&args.input).await?;

    let image = ImagePreprocessor::new().normalize(frame, &options).await?;
    tokio::fs::write(&args.output, image.bytes()).await?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        width = image.width(),
        height = image.height(),
        "Image normalized"
    );

    emit_json(&ImageSummary::from(&image), None).await
}

pub async fn compress(args: CompressArgs, config: &CaptureConfig) -> Result<()> {
    let options = args.image.apply(&config.normalize)?;
    let frame = read_upload(&args.input).await?;

    let outcome = ImagePreprocessor::new()
        .compress_to_target_size(frame, args.target_bytes, &options)
        .await?;
    tokio::fs::write(&args.output, outcome.image.bytes()).await?;
    info!(
        output = %args.output.display(),
        bytes = outcome.image.byte_size(),
        target_bytes = args.target_bytes,
        met_target = outcome.met_target,
        "Image compressed"
    );

    emit_json(
        &json!({
            "image": ImageSummary::from(&outcome.image),
            "qualityUsed": outcome.quality_used,
            "metTarget": outcome.met_target,
            "targetBytes": args.target_bytes,
        }),
        None,
    )
    .await
}
