// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline configuration
//!
//! Loaded from a TOML file (every section optional), then overlaid with
//! `CAPTURE_*` environment variables, then validated.
//!
//! ```toml
//! retry_on_validation_failure = false
//!
//! [normalize]
//! max_width = 1920
//! quality = 0.85
//!
//! [recognition]
//! endpoint = "http://localhost:8090"
//! timeout_ms = 10000
//!
//! [recognition.mock]
//! enabled = true
//! confidences = [0.5, 0.95]
//!
//! [gate]
//! threshold = 0.9
//! max_retries = 3
//!
//! [batch]
//! max_pages = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::capture::BatchConfig;
use crate::recognition::{GateConfig, RecognitionConfig};
use crate::vision::NormalizeOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    #[error("Invalid {section} configuration: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub normalize: NormalizeOptions,
    pub recognition: RecognitionConfig,
    pub gate: GateConfig,
    pub batch: BatchConfig,
    /// Count `validate-result` rejections against the attempt budget
    /// instead of failing the session immediately
    pub retry_on_validation_failure: bool,
}

impl CaptureConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overlaid with `CAPTURE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// File (or defaults), then environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        debug!(
            config_file = ?path,
            mock = config.recognition.mock.enabled,
            threshold = config.gate.threshold,
            "Capture configuration loaded"
        );
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Overlay values from `lookup`, keyed by `CAPTURE_*` variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides(lookup);

        if let Some(endpoint) = env.get("CAPTURE_ENDPOINT") {
            self.recognition.endpoint = endpoint;
        }
        env.parse("CAPTURE_TIMEOUT_MS", &mut self.recognition.timeout_ms)?;
        env.parse("CAPTURE_NETWORK_MAX_RETRIES", &mut self.recognition.retry.max_retries)?;
        env.parse("CAPTURE_BACKOFF_INITIAL_MS", &mut self.recognition.retry.initial_delay_ms)?;
        env.parse("CAPTURE_BACKOFF_MAX_MS", &mut self.recognition.retry.max_delay_ms)?;

        env.flag("CAPTURE_MOCK_ENABLED", &mut self.recognition.mock.enabled)?;
        env.parse("CAPTURE_MOCK_DELAY_MS", &mut self.recognition.mock.delay_ms)?;
        env.parse("CAPTURE_MOCK_FAILURE_RATE", &mut self.recognition.mock.failure_rate)?;
        if let Some(raw) = env.get("CAPTURE_MOCK_CONFIDENCES") {
            self.recognition.mock.confidences = raw
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| ConfigError::Env {
                    var: "CAPTURE_MOCK_CONFIDENCES".to_string(),
                    value: raw.clone(),
                })?;
        }

        env.parse("CAPTURE_CONFIDENCE_THRESHOLD", &mut self.gate.threshold)?;
        env.parse("CAPTURE_MAX_RETRIES", &mut self.gate.max_retries)?;

        env.parse("CAPTURE_MAX_WIDTH", &mut self.normalize.max_width)?;
        env.parse("CAPTURE_MAX_HEIGHT", &mut self.normalize.max_height)?;
        env.parse("CAPTURE_QUALITY", &mut self.normalize.quality)?;
        env.parse("CAPTURE_MAX_INPUT_BYTES", &mut self.normalize.max_input_bytes)?;
        env.flag("CAPTURE_AUTO_ROTATE", &mut self.normalize.auto_rotate)?;

        env.parse("CAPTURE_BATCH_MAX_PAGES", &mut self.batch.max_pages)?;
        env.parse("CAPTURE_BATCH_PARALLELISM", &mut self.batch.parallelism)?;

        env.flag(
            "CAPTURE_RETRY_ON_VALIDATION_FAILURE",
            &mut self.retry_on_validation_failure,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.normalize
            .validate()
            .map_err(|e| invalid("normalize", e.to_string()))?;
        self.recognition
            .validate()
            .map_err(|reason| invalid("recognition", reason))?;
        self.gate.validate().map_err(|reason| invalid("gate", reason))?;
        self.batch.validate().map_err(|reason| invalid("batch", reason))?;
        Ok(())
    }
}

fn invalid(section: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { section, reason }
}

struct Overrides<F>(F);

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, var: &str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = self.get(var) {
            *slot = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    fn flag(&self, var: &str, slot: &mut bool) -> Result<(), ConfigError> {
        if let Some(raw) = self.get(var) {
            *slot = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: var.to_string(),
                        value: raw,
                    })
                }
            };
        }
        Ok(())
    }
}
