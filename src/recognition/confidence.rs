// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Quality gate deciding between accept, recapture and failure

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum accepted confidence, 0.0-1.0
    pub threshold: f64,
    /// Total attempts per session, including the first
    pub max_retries: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            max_retries: 3,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "gate threshold must be within 0..1, got {}",
                self.threshold
            ));
        }
        if self.max_retries == 0 {
            return Err("gate max_retries must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    /// Below threshold with attempts left
    Retry,
    /// Below threshold and the attempt budget is spent
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    config: GateConfig,
}

impl ConfidenceGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// `attempts` counts attempts made so far, the current one included
    pub fn evaluate(&self, confidence: f64, attempts: u32) -> GateDecision {
        if confidence >= self.config.threshold {
            GateDecision::Accept
        } else {
            self.after_rejection(attempts)
        }
    }

    /// Decision for an attempt rejected for reasons other than confidence
    pub fn after_rejection(&self, attempts: u32) -> GateDecision {
        if attempts < self.config.max_retries {
            GateDecision::Retry
        } else {
            GateDecision::Exhausted
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
