// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the code loader

use thiserror::Error;

/// Boxed error raised by a loading collaborator (compiler, runner, native loader)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while requiring or loading code
#[derive(Debug, Error)]
pub enum LoadError {
    /// No candidate matched the search path or the direct path
    #[error("no such file to load -- {name}")]
    NotFound {
        /// The name as originally requested
        name: String,
    },

    /// A precompiled unit failed validation
    #[error("invalid precompiled unit for '{name}'")]
    InvalidCache {
        /// The name as originally requested
        name: String,
    },

    /// Compilation, execution or native link failure, passed through verbatim
    #[error(transparent)]
    Delegated(BoxError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl LoadError {
    /// Create a not-found error for the requested name
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an invalid-cache error for the requested name
    pub fn invalid_cache(name: impl Into<String>) -> Self {
        Self::InvalidCache { name: name.into() }
    }

    /// Wrap an error raised by a collaborator
    pub fn delegated(err: impl Into<BoxError>) -> Self {
        Self::Delegated(err.into())
    }

    /// The requested name for resolution failures
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::NotFound { name } | Self::InvalidCache { name } => Some(name),
            _ => None,
        }
    }

    /// Returns the collaborator's error if this failure came from a delegated load
    pub fn as_delegated(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Delegated(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("syntax error on line 3")]
    struct FakeCompileError;

    #[test]
    fn test_not_found_message_carries_name() {
        let err = LoadError::not_found("json");
        assert_eq!(err.to_string(), "no such file to load -- json");
        assert_eq!(err.name(), Some("json"));
    }

    #[test]
    fn test_invalid_cache_distinct_from_not_found() {
        let err = LoadError::invalid_cache("json");
        assert_ne!(err.to_string(), LoadError::not_found("json").to_string());
        assert!(matches!(err, LoadError::InvalidCache { .. }));
    }

    #[test]
    fn test_delegated_is_transparent() {
        let err = LoadError::delegated(FakeCompileError);
        assert_eq!(err.to_string(), "syntax error on line 3");
        let inner = err.as_delegated().unwrap();
        assert!(inner.downcast_ref::<FakeCompileError>().is_some());
    }
}
