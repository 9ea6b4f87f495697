// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capture states and the transition table
//!
//! `transition` is pure: it maps (state, event) to the next state plus the
//! bookkeeping effects the machine must carry out, in order, before the new
//! state takes effect. Phase work (acquire, capture, normalize, submit) is
//! done by the machine before it requests the transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::plugins::HookName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureState {
    #[default]
    SelectingInput,
    CameraActive,
    Preprocessing,
    Submitting,
    ConfidenceCheck,
    Success,
    Error,
    Cancelled,
}

impl CaptureState {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureState::SelectingInput => "selecting-input",
            CaptureState::CameraActive => "camera-active",
            CaptureState::Preprocessing => "preprocessing",
            CaptureState::Submitting => "submitting",
            CaptureState::ConfidenceCheck => "confidence-check",
            CaptureState::Success => "success",
            CaptureState::Error => "error",
            CaptureState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaptureState::Success | CaptureState::Error | CaptureState::Cancelled
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    StartCamera,
    Capture,
    UploadFile,
    Normalized,
    Responded,
    /// Gate accepted the result
    Accept,
    /// Gate asked for another attempt; `from_camera` picks the re-entry state
    Recapture { from_camera: bool },
    /// Attempt failed; `notify` runs the `on-error` chain
    Fail { notify: bool },
    Cancel,
    /// Explicit caller retry after an error
    Retry,
}

/// Bookkeeping the machine performs while applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RunHook(HookName),
    ReleaseCamera,
    /// Set `attempts` to 1
    BeginAttempt,
    IncrementAttempts,
    ResetAttempts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CaptureState,
    pub to: CaptureState,
    pub effects: &'static [Effect],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid capture transition: {event:?} in state {state}")]
pub struct InvalidTransition {
    pub state: CaptureState,
    pub event: CaptureEvent,
}

const NONE: &[Effect] = &[];
const BEGIN: &[Effect] = &[Effect::BeginAttempt];
const ACCEPT: &[Effect] = &[Effect::RunHook(HookName::OnSuccess), Effect::ReleaseCamera];
const RECAPTURE: &[Effect] = &[Effect::RunHook(HookName::OnRetry), Effect::IncrementAttempts];
const FAIL_NOTIFY: &[Effect] = &[Effect::RunHook(HookName::OnError), Effect::ReleaseCamera];
const FAIL_SILENT: &[Effect] = &[Effect::ReleaseCamera];
const CANCEL: &[Effect] = &[Effect::RunHook(HookName::OnCancel), Effect::ReleaseCamera];
const RETRY: &[Effect] = &[Effect::ResetAttempts];

pub fn transition(state: CaptureState, event: CaptureEvent) -> Result<Transition, InvalidTransition> {
    use CaptureEvent as E;
    use CaptureState as S;

    let (to, effects) = match (state, event) {
        (S::SelectingInput, E::StartCamera) => (S::CameraActive, BEGIN),
        (S::SelectingInput, E::UploadFile) => (S::Preprocessing, BEGIN),
        (S::CameraActive, E::Capture) => (S::Preprocessing, NONE),
        (S::Preprocessing, E::Normalized) => (S::Submitting, NONE),
        (S::Submitting, E::Responded) => (S::ConfidenceCheck, NONE),
        (S::ConfidenceCheck, E::Accept) => (S::Success, ACCEPT),
        (S::ConfidenceCheck, E::Recapture { from_camera: true }) => (S::CameraActive, RECAPTURE),
        (S::ConfidenceCheck, E::Recapture { from_camera: false }) => (S::Preprocessing, RECAPTURE),
        (s, E::Fail { notify }) if !s.is_terminal() => {
            (S::Error, if notify { FAIL_NOTIFY } else { FAIL_SILENT })
        }
        (s, E::Cancel) if !s.is_terminal() => (S::Cancelled, CANCEL),
        (S::Error, E::Retry) => (S::SelectingInput, RETRY),
        _ => return Err(InvalidTransition { state, event }),
    };

    Ok(Transition {
        from: state,
        to,
        effects,
    })
}
