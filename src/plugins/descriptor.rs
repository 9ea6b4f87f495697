// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plugin descriptor: id, version and declared hooks

use std::collections::HashMap;

use super::hooks::{HookHandler, HookName};

#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    id: String,
    version: String,
    hooks: HashMap<HookName, HookHandler>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            hooks: HashMap::new(),
        }
    }

    /// Declare a handler; a later call for the same hook replaces it
    pub fn with_hook(mut self, hook: HookName, handler: HookHandler) -> Self {
        self.hooks.insert(hook, handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn handler(&self, hook: HookName) -> Option<&HookHandler> {
        self.hooks.get(&hook)
    }

    pub fn declares(&self, hook: HookName) -> bool {
        self.hooks.contains_key(&hook)
    }

    /// Declared hooks in canonical order
    pub fn hooks(&self) -> Vec<HookName> {
        HookName::ALL
            .into_iter()
            .filter(|h| self.hooks.contains_key(h))
            .collect()
    }
}
