// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Collaborators that do the actual loading
//!
//! The loader decides *what* to load and *whether* to load it. Turning a
//! file into something runnable and running it is left to these traits,
//! parameterized over the engine's compiled unit type `U`.

use crate::error::BoxError;
use std::path::{Path, PathBuf};

/// A source file about to be compiled and run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Run the script in an isolated top-level scope (`load` with wrapping)
    pub wrap: bool,
}

impl ScriptInfo {
    /// Describe the script at `path`
    pub fn new(path: impl Into<PathBuf>, wrap: bool) -> Self {
        Self {
            path: path.into(),
            wrap,
        }
    }
}

/// Compiles a source file into a runnable unit
pub trait Compiler<U>: Send + Sync {
    /// Compile the script
    fn compile(&self, script: &ScriptInfo) -> Result<U, BoxError>;
}

/// Executes compiled units
pub trait ScriptRunner<U>: Send + Sync {
    /// Run a unit produced by the compiler or the precompiled cache
    fn run(&self, unit: U, script: &ScriptInfo) -> Result<(), BoxError>;
}

/// Links and initializes native extension libraries
pub trait NativeExtensionLoader: Send + Sync {
    /// Load the library at `path` and run the init function for `name`
    fn load_extension(&self, path: &Path, name: &str) -> Result<(), BoxError>;
}

/// Outcome of a precompiled cache lookup
#[derive(Debug)]
pub enum CacheLookup<U> {
    /// A valid unit and the source path it was compiled from
    Found {
        /// The compiled unit
        unit: U,
        /// Path recorded as the feature
        path: PathBuf,
    },
    /// Nothing cached under that name
    Absent,
    /// A cache entry exists but failed validation
    Invalid,
}

/// Store of previously compiled units
pub trait PrecompiledCache<U>: Send + Sync {
    /// Look up `name` as it would be required with `source_extension`
    fn lookup(&self, name: &str, source_extension: &str) -> CacheLookup<U>;
}

impl<U, F> Compiler<U> for F
where
    F: Fn(&ScriptInfo) -> Result<U, BoxError> + Send + Sync,
{
    fn compile(&self, script: &ScriptInfo) -> Result<U, BoxError> {
        self(script)
    }
}

impl<U, F> ScriptRunner<U> for F
where
    F: Fn(U, &ScriptInfo) -> Result<(), BoxError> + Send + Sync,
{
    fn run(&self, unit: U, script: &ScriptInfo) -> Result<(), BoxError> {
        self(unit, script)
    }
}

impl<F> NativeExtensionLoader for F
where
    F: Fn(&Path, &str) -> Result<(), BoxError> + Send + Sync,
{
    fn load_extension(&self, path: &Path, name: &str) -> Result<(), BoxError> {
        self(path, name)
    }
}

/// Native loader for engines without extension support
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeExtensions;

impl NativeExtensionLoader for NoNativeExtensions {
    fn load_extension(&self, path: &Path, _name: &str) -> Result<(), BoxError> {
        Err(format!("native extensions are not supported: {}", path.display()).into())
    }
}
