// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod imaging;
pub mod pipeline;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CaptureConfig;

/// Fleet vision capture CLI
#[derive(Parser, Debug)]
#[command(name = "capture-cli")]
#[command(version)]
#[command(about = "Capture, normalize and recognize fleet vehicle images", long_about = None)]
pub struct Cli {
    /// TOML configuration file (CAPTURE_* environment variables override it)
    #[arg(long, global = true, env = "CAPTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the mock recognition transport instead of the HTTP service
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one capture session (file upload or synthetic camera) and print the report
    Scan(pipeline::ScanArgs),

    /// Submit several images as one multi-page batch
    Batch(pipeline::BatchArgs),

    /// Normalize an image (orientation, resize, re-encode)
    Normalize(imaging::NormalizeArgs),

    /// Compress an image to fit a byte budget
    Compress(imaging::CompressArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = CaptureConfig::load(cli.config.as_deref())?;
    if cli.mock {
        config.recognition.mock.enabled = true;
    }

    match cli.command {
        Commands::Scan(args) => pipeline::scan(args, &config).await,
        Commands::Batch(args) => pipeline::batch(args, &config).await,
        Commands::Normalize(args) => imaging::normalize(args, &config).await,
        Commands::Compress(args) => imaging::compress(args, &config).await,
    }
}

/// Print `value` as JSON to `output`, or stdout when unset
pub(crate) async fn emit_json<T: serde::Serialize>(
    value: &T,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{}", json),
    }
    Ok(())
}
