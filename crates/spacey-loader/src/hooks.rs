// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Observer hooks fired by the loader

use crate::backend::ScriptInfo;
use crate::resolver::ResolvedTarget;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

type CompiledHook = Arc<dyn Fn(&ScriptInfo) + Send + Sync>;
type LoadedHook = Arc<dyn Fn(&str, &ResolvedTarget) + Send + Sync>;

/// Registered observers.
///
/// Hooks run on the loading thread with no loader locks held, so they may
/// call back into the loader.
#[derive(Default)]
pub struct LoaderHooks {
    compiled: RwLock<Vec<CompiledHook>>,
    loaded: RwLock<Vec<LoadedHook>>,
}

impl LoaderHooks {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe every successful compilation, before the script runs
    pub fn on_compiled(&self, hook: impl Fn(&ScriptInfo) + Send + Sync + 'static) {
        self.compiled.write().push(Arc::new(hook));
    }

    /// Observe every feature recorded by `require`, with the requested name
    pub fn on_loaded(&self, hook: impl Fn(&str, &ResolvedTarget) + Send + Sync + 'static) {
        self.loaded.write().push(Arc::new(hook));
    }

    pub(crate) fn trigger_compiled(&self, script: &ScriptInfo) {
        let hooks = self.compiled.read().clone();
        for hook in hooks {
            hook(script);
        }
    }

    pub(crate) fn trigger_loaded(&self, name: &str, target: &ResolvedTarget) {
        let hooks = self.loaded.read().clone();
        for hook in hooks {
            hook(name, target);
        }
    }
}

impl fmt::Debug for LoaderHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderHooks")
            .field("compiled", &self.compiled.read().len())
            .field("loaded", &self.loaded.read().len())
            .finish()
    }
}
