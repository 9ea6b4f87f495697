// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plugin hooks around a capture session
//!
//! A plugin is a `PluginDescriptor` (id, version, hook handlers) registered
//! once with a `PluginRuntime`. The runtime dispatches by iterating the
//! registered descriptors in order and calling the handler each declares for
//! the hook at hand.

pub mod context;
pub mod descriptor;
pub mod hooks;
pub mod runtime;

pub use context::PluginContext;
pub use descriptor::PluginDescriptor;
pub use hooks::{
    HookHandler, HookKind, HookName, LifecycleHook, RenderHook, ResultHook, ValidateHook,
};
pub use runtime::{
    HookError, HookOutcome, PluginError, PluginRuntime, RegistrationError, RenderOutput,
    ValidationError,
};
