// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `require` / `load` entry points

use crate::backend::{
    CacheLookup, Compiler, NativeExtensionLoader, NoNativeExtensions, PrecompiledCache,
    ScriptInfo, ScriptRunner,
};
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::hooks::LoaderHooks;
use crate::load_path::LoadPath;
use crate::pending::{Acquire, PendingTable, TicketGuard, WaitOutcome};
use crate::registry::{FeatureLog, FeatureRegistry, SharedFeatureLog};
use crate::resolver::{
    Extensions, PathResolver, ResolveMode, ResolvedTarget, TargetKind, expand_path,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful `require`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireStatus {
    /// This call loaded the feature
    Loaded,
    /// The feature was already loaded, possibly by another thread while we waited
    AlreadyLoaded,
    /// This thread is in the middle of loading the feature (recursive require)
    LoadingOnThisThread,
}

impl RequireStatus {
    /// True only when this call performed the load
    pub fn loaded(self) -> bool {
        self == Self::Loaded
    }
}

/// A resolved target plus the unit the precompiled cache handed back, if any
struct Resolution<U> {
    target: ResolvedTarget,
    unit: Option<U>,
}

/// Resolves, deduplicates and loads code.
///
/// One `CodeLoader` is shared by every thread of a runtime. `require` loads
/// each feature at most once; concurrent requires of the same file wait for
/// the first one and retry if it fails. `load` always runs the file.
pub struct CodeLoader<U> {
    resolver: PathResolver,
    registry: FeatureRegistry,
    pending: PendingTable,
    compiler: Box<dyn Compiler<U>>,
    runner: Box<dyn ScriptRunner<U>>,
    native: Box<dyn NativeExtensionLoader>,
    precompiled: Option<Box<dyn PrecompiledCache<U>>>,
    hooks: LoaderHooks,
}

impl<U> CodeLoader<U> {
    /// Start building a loader around a compiler and runner
    pub fn builder(
        compiler: impl Compiler<U> + 'static,
        runner: impl ScriptRunner<U> + 'static,
    ) -> CodeLoaderBuilder<U> {
        CodeLoaderBuilder {
            config: LoaderConfig::default(),
            load_path: None,
            feature_log: None,
            working_dir: None,
            compiler: Box::new(compiler),
            runner: Box::new(runner),
            native: Box::new(NoNativeExtensions),
            precompiled: None,
        }
    }

    /// Load the feature named `name` unless it is already loaded.
    ///
    /// Errors from the compiler, runner or native loader are returned
    /// unchanged; threads that were waiting on this load retry it.
    pub fn require(&self, name: &str) -> Result<RequireStatus> {
        loop {
            if self.is_provided(name) {
                debug!("'{}' already provided", name);
                return Ok(RequireStatus::AlreadyLoaded);
            }

            let Some(Resolution { target, unit }) = self.resolve_require(name)? else {
                // Another thread may have finished it while we searched
                if self.is_provided(name) {
                    return Ok(RequireStatus::AlreadyLoaded);
                }
                return Err(LoadError::not_found(name));
            };

            if self.registry.is_loaded(&target.feature) {
                debug!("'{}' already loaded as {}", name, target.feature);
                return Ok(RequireStatus::AlreadyLoaded);
            }

            match self.pending.acquire_or_join(&target.canonical_path) {
                Acquire::Owned(guard) => {
                    // Another owner may have finished between the check above
                    // and taking the ticket
                    if self.registry.is_loaded(&target.feature) {
                        debug!("'{}' loaded by another thread before ownership", name);
                        guard.succeed();
                        return Ok(RequireStatus::AlreadyLoaded);
                    }
                    return self.load_owned(name, target, unit, guard);
                }
                Acquire::OwnedByCaller => return Ok(RequireStatus::LoadingOnThisThread),
                Acquire::Wait(ticket) => match self.pending.wait(ticket) {
                    WaitOutcome::Loaded => return Ok(RequireStatus::AlreadyLoaded),
                    WaitOutcome::Failed => {
                        warn!("Load of {} failed on another thread, retrying", target.feature);
                    }
                },
            }
        }
    }

    /// Require `name` relative to the directory of the script at `base`,
    /// or to the working directory when there is no base script.
    pub fn require_relative(&self, name: &str, base: Option<&Path>) -> Result<RequireStatus> {
        let dir = match base {
            Some(script) => {
                let script = self.resolver.expand(script);
                let parent = script.parent().unwrap_or(Path::new("/"));
                std::fs::canonicalize(parent)?
            }
            None => self.resolver.expand(Path::new(".")),
        };
        let path = expand_path(Path::new(name), &dir);
        self.require(&path.to_string_lossy())
    }

    /// Run the source file at `path`, whether or not it ran before.
    pub fn load(&self, path: &str) -> Result<()> {
        self.load_wrapped(path, false)
    }

    /// [`load`](Self::load), optionally wrapping the script in its own scope
    pub fn load_wrapped(&self, path: &str, wrap: bool) -> Result<()> {
        let target = self
            .resolver
            .resolve(path, ResolveMode::Load)
            .ok_or_else(|| LoadError::not_found(path))?;
        debug!("Loading {}", target.canonical_path.display());

        let script = ScriptInfo::new(target.canonical_path, wrap);
        let unit = self.compile(&script)?;
        self.run(unit, &script)
    }

    /// Whether `require(name)` would be satisfied without searching
    pub fn is_provided(&self, name: &str) -> bool {
        let feature = self.resolver.extensions().provided_name(name);
        self.registry.is_loaded(&feature)
    }

    /// Resolve `name` the way `require` would, without loading it
    pub fn resolve(&self, name: &str) -> Option<ResolvedTarget> {
        self.resolver.resolve(name, ResolveMode::Require)
    }

    /// Contents of the feature log
    pub fn loaded_features(&self) -> Vec<String> {
        self.registry.features()
    }

    /// The shared search path
    pub fn load_path(&self) -> &LoadPath {
        self.resolver.load_path()
    }

    /// The feature registry
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Loads currently in progress
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Observer hooks
    pub fn hooks(&self) -> &LoaderHooks {
        &self.hooks
    }

    fn resolve_require(&self, name: &str) -> Result<Option<Resolution<U>>> {
        if let Some(cache) = &self.precompiled {
            let source_extension = &self.resolver.extensions().source;
            match cache.lookup(name, source_extension) {
                CacheLookup::Found { unit, path } => {
                    let path = self.resolver.expand(&path);
                    debug!("'{}' found in precompiled cache as {}", name, path.display());
                    let short_name = self.resolver.extensions().provided_name(name).into_owned();
                    return Ok(Some(Resolution {
                        target: ResolvedTarget::precompiled(short_name, path),
                        unit: Some(unit),
                    }));
                }
                CacheLookup::Invalid => return Err(LoadError::invalid_cache(name)),
                CacheLookup::Absent => {}
            }
        }

        Ok(self
            .resolver
            .resolve(name, ResolveMode::Require)
            .map(|target| Resolution { target, unit: None }))
    }

    fn load_owned(
        &self,
        name: &str,
        target: ResolvedTarget,
        unit: Option<U>,
        guard: TicketGuard<'_>,
    ) -> Result<RequireStatus> {
        let result = match target.kind {
            TargetKind::Source => {
                let script = ScriptInfo::new(&target.canonical_path, false);
                self.compile(&script).and_then(|unit| self.run(unit, &script))
            }
            TargetKind::NativeLibrary => {
                let module = target.module_name(&self.resolver.extensions().library);
                self.native
                    .load_extension(&target.canonical_path, &module)
                    .map_err(LoadError::Delegated)
            }
            TargetKind::PrecompiledCache => {
                let script = ScriptInfo::new(&target.canonical_path, false);
                match unit {
                    Some(unit) => self.run(unit, &script),
                    None => Err(LoadError::invalid_cache(name)),
                }
            }
        };

        match result {
            Ok(()) => {
                self.registry.record_loaded(&target.feature, &target.short_name);
                guard.succeed();
                debug!("Required '{}' from {}", name, target.canonical_path.display());
                self.hooks.trigger_loaded(name, &target);
                Ok(RequireStatus::Loaded)
            }
            Err(err) => {
                guard.fail();
                debug!("Require of '{}' failed: {}", name, err);
                Err(err)
            }
        }
    }

    fn compile(&self, script: &ScriptInfo) -> Result<U> {
        let unit = self.compiler.compile(script).map_err(LoadError::Delegated)?;
        self.hooks.trigger_compiled(script);
        Ok(unit)
    }

    fn run(&self, unit: U, script: &ScriptInfo) -> Result<()> {
        self.runner.run(unit, script).map_err(LoadError::Delegated)
    }
}

impl<U> fmt::Debug for CodeLoader<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeLoader")
            .field("resolver", &self.resolver)
            .field("registry", &self.registry)
            .field("pending", &self.pending)
            .field("precompiled", &self.precompiled.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for [`CodeLoader`]
pub struct CodeLoaderBuilder<U> {
    config: LoaderConfig,
    load_path: Option<LoadPath>,
    feature_log: Option<Arc<dyn FeatureLog>>,
    working_dir: Option<PathBuf>,
    compiler: Box<dyn Compiler<U>>,
    runner: Box<dyn ScriptRunner<U>>,
    native: Box<dyn NativeExtensionLoader>,
    precompiled: Option<Box<dyn PrecompiledCache<U>>>,
}

impl<U> CodeLoaderBuilder<U> {
    /// Extensions and initial search path
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing search path instead of creating one from the config
    pub fn load_path(mut self, load_path: LoadPath) -> Self {
        self.load_path = Some(load_path);
        self
    }

    /// Record features in an existing log
    pub fn feature_log(mut self, log: Arc<dyn FeatureLog>) -> Self {
        self.feature_log = Some(log);
        self
    }

    /// Resolve relative names against `dir` instead of the process working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Loader for native extension libraries
    pub fn native_loader(mut self, native: impl NativeExtensionLoader + 'static) -> Self {
        self.native = Box::new(native);
        self
    }

    /// Cache consulted before searching the load path
    pub fn precompiled_cache(mut self, cache: impl PrecompiledCache<U> + 'static) -> Self {
        self.precompiled = Some(Box::new(cache));
        self
    }

    /// Build the loader, rejecting an invalid configuration
    pub fn build(self) -> Result<CodeLoader<U>> {
        self.config.validate()?;
        let extensions = Extensions::from_config(&self.config);
        let load_path = self
            .load_path
            .unwrap_or_else(|| LoadPath::new(self.config.load_path.clone()));
        let mut resolver = PathResolver::new(load_path, extensions);
        if let Some(dir) = self.working_dir {
            resolver = resolver.with_working_dir(dir);
        }
        let log = self
            .feature_log
            .unwrap_or_else(|| Arc::new(SharedFeatureLog::new()));

        Ok(CodeLoader {
            resolver,
            registry: FeatureRegistry::new(log),
            pending: PendingTable::new(),
            compiler: self.compiler,
            runner: self.runner,
            native: self.native,
            precompiled: self.precompiled,
            hooks: LoaderHooks::new(),
        })
    }
}
