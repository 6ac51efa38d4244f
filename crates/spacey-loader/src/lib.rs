// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! Resolution and single-flight loading behind `require` and `load`.
//!
//! - **Resolution**: names are searched for along a shared, mutable
//!   [`LoadPath`]; source files win over native libraries in the same
//!   directory and the first directory with a match wins.
//! - **Deduplication**: loaded features are recorded in a [`FeatureLog`]
//!   that other code may also modify; the [`FeatureRegistry`] indexes it and
//!   detects outside changes.
//! - **Coordination**: concurrent requires of the same file are collapsed
//!   into one load by the [`PendingTable`]. Waiters block until the owner
//!   finishes and start over if it failed. Recursive requires on the loading
//!   thread return immediately instead of deadlocking.
//!
//! Compiling and running code is delegated to a [`Compiler`] and a
//! [`ScriptRunner`] supplied by the engine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{CodeLoader, LoaderConfig, RequireStatus};
//!
//! let loader = CodeLoader::builder(engine.compiler(), engine.runner())
//!     .config(LoaderConfig::load()?)
//!     .build()?;
//!
//! assert_eq!(loader.require("json")?, RequireStatus::Loaded);
//! assert_eq!(loader.require("json")?, RequireStatus::AlreadyLoaded);
//! loader.load("setup.rb")?; // always runs
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod hooks;
pub mod load_path;
pub mod loader;
pub mod pending;
pub mod registry;
pub mod resolver;

// Re-exports
pub use backend::{
    CacheLookup, Compiler, NativeExtensionLoader, NoNativeExtensions, PrecompiledCache,
    ScriptInfo, ScriptRunner,
};
pub use config::LoaderConfig;
pub use error::{BoxError, LoadError, Result};
pub use hooks::LoaderHooks;
pub use load_path::LoadPath;
pub use loader::{CodeLoader, CodeLoaderBuilder, RequireStatus};
pub use pending::{Acquire, LoadTicket, PendingTable, TicketGuard, WaitOutcome};
pub use registry::{FeatureLog, FeatureRegistry, SharedFeatureLog};
pub use resolver::{Extensions, PathResolver, ResolveMode, ResolvedTarget, TargetKind};

/// Version of spacey-loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
