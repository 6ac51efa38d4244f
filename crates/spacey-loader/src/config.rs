// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `SPACEY_*` environment variables.

use crate::error::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding extra search directories (platform path-list syntax)
pub const ENV_LOAD_PATH: &str = "SPACEY_LOAD_PATH";
/// Environment variable overriding the source extension
pub const ENV_SOURCE_EXT: &str = "SPACEY_SOURCE_EXT";
/// Environment variable overriding the native library suffix
pub const ENV_LIBRARY_SUFFIX: &str = "SPACEY_LIBRARY_SUFFIX";

/// Default extension for source files
pub const DEFAULT_SOURCE_EXTENSION: &str = ".rb";

/// Generic native suffix accepted as an alias for the platform's own
pub const GENERIC_LIBRARY_SUFFIX: &str = ".so";

/// Configuration for a [`CodeLoader`](crate::CodeLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Initial search directories, in priority order
    pub load_path: Vec<PathBuf>,

    /// Extension of source files (e.g. `.rb`)
    pub source_extension: String,

    /// Platform native library suffix (e.g. `.so`, `.dylib`, `.dll`)
    pub library_suffix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_path: Vec::new(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            library_suffix: std::env::consts::DLL_SUFFIX.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Defaults merged with the environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded loader config from {}", path.display());
        Ok(config)
    }

    /// Apply `SPACEY_*` environment overrides.
    ///
    /// Directories from `SPACEY_LOAD_PATH` are placed ahead of the configured ones.
    pub fn apply_env(&mut self) {
        if let Some(paths) = std::env::var_os(ENV_LOAD_PATH) {
            let mut dirs: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            dirs.append(&mut self.load_path);
            self.load_path = dirs;
        }
        if let Ok(ext) = std::env::var(ENV_SOURCE_EXT) {
            self.set("source-extension", &ext);
        }
        if let Ok(suffix) = std::env::var(ENV_LIBRARY_SUFFIX) {
            self.set("library-suffix", &suffix);
        }
    }

    /// Set a configuration value by key. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "source-extension" => self.source_extension = dotted(value),
            "library-suffix" => self.library_suffix = dotted(value),
            "load-path" => {
                self.load_path = std::env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect();
            }
            _ => debug!("Ignoring unknown loader config key {}", key),
        }
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "source-extension" => Some(self.source_extension.clone()),
            "library-suffix" => Some(self.library_suffix.clone()),
            "load-path" => std::env::join_paths(&self.load_path)
                .ok()
                .map(|p| p.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Both extensions must be dotted, non-empty and distinct
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("source_extension", &self.source_extension),
            ("library_suffix", &self.library_suffix),
        ] {
            if value.len() < 2 || !value.starts_with('.') {
                return Err(LoadError::Config(format!(
                    "{} must be a dotted extension, got '{}'",
                    key, value
                )));
            }
        }
        if self.source_extension == self.library_suffix {
            return Err(LoadError::Config(
                "source_extension and library_suffix must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn dotted(value: &str) -> String {
    if value.starts_with('.') {
        value.to_string()
    } else {
        format!(".{}", value)
    }
}
