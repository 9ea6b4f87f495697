// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hook names and handler shapes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::context::PluginContext;

/// Fixed set of hooks a plugin may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookName {
    BeforeCapture,
    AfterCapture,
    TransformResult,
    ValidateResult,
    EnrichResult,
    OnRetry,
    OnError,
    OnSuccess,
    OnCancel,
    RenderOverlay,
    RenderToolbar,
    RenderResultBadge,
}

/// Handler shape a hook expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    /// Side effects on the context only
    Lifecycle,
    /// Payload in, payload out
    Result,
    /// Payload in, verdict out
    Validate,
    /// UI decoration, inert without a UI host
    Render,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::Lifecycle => "lifecycle",
            HookKind::Result => "result",
            HookKind::Validate => "validate",
            HookKind::Render => "render",
        };
        f.write_str(s)
    }
}

impl HookName {
    pub const ALL: [HookName; 12] = [
        HookName::BeforeCapture,
        HookName::AfterCapture,
        HookName::TransformResult,
        HookName::ValidateResult,
        HookName::EnrichResult,
        HookName::OnRetry,
        HookName::OnError,
        HookName::OnSuccess,
        HookName::OnCancel,
        HookName::RenderOverlay,
        HookName::RenderToolbar,
        HookName::RenderResultBadge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookName::BeforeCapture => "before-capture",
            HookName::AfterCapture => "after-capture",
            HookName::TransformResult => "transform-result",
            HookName::ValidateResult => "validate-result",
            HookName::EnrichResult => "enrich-result",
            HookName::OnRetry => "on-retry",
            HookName::OnError => "on-error",
            HookName::OnSuccess => "on-success",
            HookName::OnCancel => "on-cancel",
            HookName::RenderOverlay => "render-overlay",
            HookName::RenderToolbar => "render-toolbar",
            HookName::RenderResultBadge => "render-result-badge",
        }
    }

    pub fn kind(self) -> HookKind {
        match self {
            HookName::TransformResult | HookName::EnrichResult => HookKind::Result,
            HookName::ValidateResult => HookKind::Validate,
            HookName::RenderOverlay | HookName::RenderToolbar | HookName::RenderResultBadge => {
                HookKind::Render
            }
            _ => HookKind::Lifecycle,
        }
    }

    /// Hooks whose failures are logged rather than aborting the attempt
    pub fn is_best_effort(self) -> bool {
        matches!(self, HookName::OnError | HookName::OnCancel)
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookName::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| format!("unknown hook '{}'", s))
    }
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn call(&self, ctx: &mut PluginContext) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ResultHook: Send + Sync {
    async fn call(&self, payload: Value, ctx: &mut PluginContext) -> anyhow::Result<Value>;
}

#[async_trait]
pub trait ValidateHook: Send + Sync {
    async fn call(&self, payload: &Value, ctx: &PluginContext) -> anyhow::Result<bool>;
}

/// Render hooks only see the context immutably
pub trait RenderHook: Send + Sync {
    fn render(&self, ctx: &PluginContext) -> Option<Value>;
}

/// A plugin's handler for one hook
#[derive(Clone)]
pub enum HookHandler {
    Lifecycle(Arc<dyn LifecycleHook>),
    Result(Arc<dyn ResultHook>),
    Validate(Arc<dyn ValidateHook>),
    Render(Arc<dyn RenderHook>),
}

impl fmt::Debug for HookHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookHandler::{}", self.kind())
    }
}

impl HookHandler {
    pub fn kind(&self) -> HookKind {
        match self {
            HookHandler::Lifecycle(_) => HookKind::Lifecycle,
            HookHandler::Result(_) => HookKind::Result,
            HookHandler::Validate(_) => HookKind::Validate,
            HookHandler::Render(_) => HookKind::Render,
        }
    }

    pub fn lifecycle<F>(f: F) -> Self
    where
        F: Fn(&mut PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        HookHandler::Lifecycle(Arc::new(FnLifecycle(f)))
    }

    pub fn result<F>(f: F) -> Self
    where
        F: Fn(Value, &mut PluginContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        HookHandler::Result(Arc::new(FnResult(f)))
    }

    pub fn validate<F>(f: F) -> Self
    where
        F: Fn(&Value, &PluginContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        HookHandler::Validate(Arc::new(FnValidate(f)))
    }

    pub fn render<F>(f: F) -> Self
    where
        F: Fn(&PluginContext) -> Option<Value> + Send + Sync + 'static,
    {
        HookHandler::Render(Arc::new(FnRender(f)))
    }
}

struct FnLifecycle<F>(F);
struct FnResult<F>(F);
struct FnValidate<F>(F);
struct FnRender<F>(F);

#[async_trait]
impl<F> LifecycleHook for FnLifecycle<F>
where
    F: Fn(&mut PluginContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn call(&self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

#[async_trait]
impl<F> ResultHook for FnResult<F>
where
    F: Fn(Value, &mut PluginContext) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, payload: Value, ctx: &mut PluginContext) -> anyhow::Result<Value> {
        (self.0)(payload, ctx)
    }
}

#[async_trait]
impl<F> ValidateHook for FnValidate<F>
where
    F: Fn(&Value, &PluginContext) -> anyhow::Result<bool> + Send + Sync,
{
    async fn call(&self, payload: &Value, ctx: &PluginContext) -> anyhow::Result<bool> {
        (self.0)(payload, ctx)
    }
}

impl<F> RenderHook for FnRender<F>
where
    F: Fn(&PluginContext) -> Option<Value> + Send + Sync,
{
    fn render(&self, ctx: &PluginContext) -> Option<Value> {
        (self.0)(ctx)
    }
}
