// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared search path for `require`

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ordered list of directories searched by `require`.
///
/// Cloning yields another handle to the same list. Any handle may mutate it
/// while resolutions are running; the resolver reads one entry at a time, so
/// changes become visible to in-progress searches immediately.
#[derive(Debug, Clone, Default)]
pub struct LoadPath {
    dirs: Arc<RwLock<Vec<PathBuf>>>,
}

impl LoadPath {
    /// Create a search path from an initial list of directories
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs: Arc::new(RwLock::new(dirs)),
        }
    }

    /// Directory at `index`, if any
    pub fn get(&self, index: usize) -> Option<PathBuf> {
        self.dirs.read().get(index).cloned()
    }

    /// Append a directory (lowest priority)
    pub fn push(&self, dir: impl Into<PathBuf>) {
        self.dirs.write().push(dir.into());
    }

    /// Prepend a directory (highest priority)
    pub fn unshift(&self, dir: impl Into<PathBuf>) {
        self.dirs.write().insert(0, dir.into());
    }

    /// Remove every occurrence of `dir`. Returns true if anything was removed.
    pub fn remove(&self, dir: &Path) -> bool {
        let mut dirs = self.dirs.write();
        let before = dirs.len();
        dirs.retain(|d| d != dir);
        dirs.len() != before
    }

    /// Remove all directories
    pub fn clear(&self) {
        self.dirs.write().clear();
    }

    /// Number of directories
    pub fn len(&self) -> usize {
        self.dirs.read().len()
    }

    /// Check if the search path is empty
    pub fn is_empty(&self) -> bool {
        self.dirs.read().is_empty()
    }

    /// Copy of the current directories
    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.dirs.read().clone()
    }
}

impl From<Vec<PathBuf>> for LoadPath {
    fn from(dirs: Vec<PathBuf>) -> Self {
        Self::new(dirs)
    }
}
