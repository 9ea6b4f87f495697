// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ordered, sequential execution of registered plugin hooks
//!
//! Every hook runs its handlers in registration order, awaiting each before
//! the next. `validate-result` stops at the first rejecting plugin. A failure
//! in any hook other than `on-error`/`on-cancel` runs the `on-error` chain
//! and is then returned as `PluginError`.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::context::PluginContext;
use super::descriptor::PluginDescriptor;
use super::hooks::{HookHandler, HookKind, HookName};
use crate::capture::errors::FailureReason;

/// Registration rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Plugin id must not be empty")]
    EmptyId,

    #[error("Plugin '{0}' is already registered")]
    DuplicateId(String),

    #[error("Plugin '{plugin_id}' declares {hook} with a {found} handler, expected {expected}")]
    IncompatibleHandler {
        plugin_id: String,
        hook: HookName,
        expected: HookKind,
        found: HookKind,
    },
}

/// A handler returned an error
#[derive(Debug, Error)]
#[error("Plugin '{plugin_id}' failed in {hook}: {cause}")]
pub struct PluginError {
    pub plugin_id: String,
    pub hook: HookName,
    #[source]
    pub cause: anyhow::Error,
}

/// A `validate-result` handler rejected the result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Result rejected by plugin '{plugin_id}'")]
pub struct ValidationError {
    pub plugin_id: String,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Output of one render handler
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub plugin_id: String,
    pub output: Value,
}

/// What `run_hook` produced, by hook kind
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Completed,
    Payload(Value),
    Rendered(Vec<RenderOutput>),
}

#[derive(Debug, Default)]
pub struct PluginRuntime {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistrationError> {
        if descriptor.id().trim().is_empty() {
            return Err(RegistrationError::EmptyId);
        }
        if self.plugins.iter().any(|p| p.id() == descriptor.id()) {
            return Err(RegistrationError::DuplicateId(descriptor.id().to_string()));
        }
        for hook in descriptor.hooks() {
            if let Some(handler) = descriptor.handler(hook) {
                if handler.kind() != hook.kind() {
                    return Err(RegistrationError::IncompatibleHandler {
                        plugin_id: descriptor.id().to_string(),
                        hook,
                        expected: hook.kind(),
                        found: handler.kind(),
                    });
                }
            }
        }

        debug!(
            plugin_id = descriptor.id(),
            version = descriptor.version(),
            hooks = ?descriptor.hooks(),
            "Plugin registered"
        );
        self.plugins.push(descriptor);
        Ok(())
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Generic dispatch by hook kind
    ///
    /// `payload` feeds result and validate hooks and is ignored otherwise.
    pub async fn run_hook(
        &self,
        hook: HookName,
        payload: Value,
        ctx: &mut PluginContext,
    ) -> Result<HookOutcome, HookError> {
        match hook.kind() {
            HookKind::Lifecycle => {
                self.run_lifecycle(hook, ctx).await?;
                Ok(HookOutcome::Completed)
            }
            HookKind::Result => Ok(HookOutcome::Payload(
                self.run_result(hook, payload, ctx).await?,
            )),
            HookKind::Validate => {
                self.run_validate(&payload, ctx).await?;
                Ok(HookOutcome::Completed)
            }
            HookKind::Render => Ok(HookOutcome::Rendered(self.run_render(hook, ctx))),
        }
    }

    pub async fn run_lifecycle(
        &self,
        hook: HookName,
        ctx: &mut PluginContext,
    ) -> Result<(), PluginError> {
        if hook.is_best_effort() {
            self.run_best_effort(hook, ctx).await;
            return Ok(());
        }
        for plugin in &self.plugins {
            let Some(HookHandler::Lifecycle(handler)) = plugin.handler(hook) else {
                continue;
            };
            debug!(session_id = %ctx.session_id, plugin_id = plugin.id(), hook = %hook, "Running hook");
            if let Err(cause) = handler.call(ctx).await {
                return Err(self.fail(plugin.id(), hook, cause, ctx).await);
            }
        }
        Ok(())
    }

    /// Run every handler for `hook`, logging failures instead of returning them
    async fn run_best_effort(&self, hook: HookName, ctx: &mut PluginContext) {
        for plugin in &self.plugins {
            let Some(HookHandler::Lifecycle(handler)) = plugin.handler(hook) else {
                continue;
            };
            debug!(session_id = %ctx.session_id, plugin_id = plugin.id(), hook = %hook, "Running hook");
            if let Err(cause) = handler.call(ctx).await {
                warn!(
                    session_id = %ctx.session_id,
                    plugin_id = plugin.id(),
                    hook = %hook,
                    "Hook failed: {:#}",
                    cause
                );
            }
        }
    }

    /// Chain `payload` through every handler for a result hook
    pub async fn run_result(
        &self,
        hook: HookName,
        payload: Value,
        ctx: &mut PluginContext,
    ) -> Result<Value, PluginError> {
        let mut payload = payload;
        for plugin in &self.plugins {
            let Some(HookHandler::Result(handler)) = plugin.handler(hook) else {
                continue;
            };
            debug!(session_id = %ctx.session_id, plugin_id = plugin.id(), hook = %hook, "Running hook");
            payload = match handler.call(payload, ctx).await {
                Ok(next) => next,
                Err(cause) => return Err(self.fail(plugin.id(), hook, cause, ctx).await),
            };
        }
        Ok(payload)
    }

    /// Run validators until one rejects
    pub async fn run_validate(
        &self,
        payload: &Value,
        ctx: &mut PluginContext,
    ) -> Result<(), HookError> {
        let hook = HookName::ValidateResult;
        for plugin in &self.plugins {
            let Some(HookHandler::Validate(handler)) = plugin.handler(hook) else {
                continue;
            };
            debug!(session_id = %ctx.session_id, plugin_id = plugin.id(), hook = %hook, "Running hook");
            match handler.call(payload, ctx).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        session_id = %ctx.session_id,
                        plugin_id = plugin.id(),
                        "Result rejected by validator"
                    );
                    return Err(ValidationError {
                        plugin_id: plugin.id().to_string(),
                    }
                    .into());
                }
                Err(cause) => return Err(self.fail(plugin.id(), hook, cause, ctx).await.into()),
            }
        }
        Ok(())
    }

    /// Collect render output; nothing is drawn without a UI host
    pub fn run_render(&self, hook: HookName, ctx: &PluginContext) -> Vec<RenderOutput> {
        if hook.kind() != HookKind::Render {
            warn!(hook = %hook, "run_render called with a non-render hook");
            return Vec::new();
        }
        self.plugins
            .iter()
            .filter_map(|plugin| match plugin.handler(hook) {
                Some(HookHandler::Render(handler)) => handler.render(ctx).map(|output| RenderOutput {
                    plugin_id: plugin.id().to_string(),
                    output,
                }),
                _ => None,
            })
            .collect()
    }

    /// Run `on-error` handlers with `ctx.last_error` set; failures are logged
    pub async fn run_on_error(&self, reason: FailureReason, ctx: &mut PluginContext) {
        ctx.last_error = Some(reason);
        self.run_best_effort(HookName::OnError, ctx).await;
    }

    async fn fail(
        &self,
        plugin_id: &str,
        hook: HookName,
        cause: anyhow::Error,
        ctx: &mut PluginContext,
    ) -> PluginError {
        let error = PluginError {
            plugin_id: plugin_id.to_string(),
            hook,
            cause,
        };
        warn!(session_id = %ctx.session_id, plugin_id, hook = %hook, "Hook failed: {:#}", error.cause);
        self.run_on_error(FailureReason::from_plugin_error(&error), ctx)
            .await;
        error
    }
}
