// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loaded feature tracking
//!
//! The feature log is a process-wide list other code may append to or edit
//! at any time. [`FeatureRegistry`] keeps a hash index over it for fast
//! membership checks and compares the log's mutation generation against the
//! one it last indexed; on mismatch the index is rebuilt from the log before
//! being trusted.

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// An ordered, externally mutable list of loaded feature names.
///
/// Every mutation must advance [`generation`](FeatureLog::generation).
pub trait FeatureLog: Send + Sync + fmt::Debug {
    /// Counter advanced by every mutation
    fn generation(&self) -> u64;

    /// Current contents, in order
    fn entries(&self) -> Vec<String>;

    /// Append a feature, returning the generation after the append
    fn push(&self, feature: String) -> u64;
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<String>,
    generation: u64,
}

/// Default [`FeatureLog`]: a shared, lock-protected vector.
///
/// Clones are handles to the same log.
#[derive(Debug, Clone, Default)]
pub struct SharedFeatureLog {
    state: Arc<RwLock<LogState>>,
}

impl SharedFeatureLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every occurrence of `feature`. Returns true if anything was removed.
    pub fn remove(&self, feature: &str) -> bool {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|f| f != feature);
        if state.entries.len() == before {
            return false;
        }
        state.generation += 1;
        true
    }

    /// Replace the contents
    pub fn replace(&self, entries: Vec<String>) {
        let mut state = self.state.write();
        state.entries = entries;
        state.generation += 1;
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Linear membership scan
    pub fn contains(&self, feature: &str) -> bool {
        self.state.read().entries.iter().any(|f| f == feature)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl FeatureLog for SharedFeatureLog {
    fn generation(&self) -> u64 {
        self.state.read().generation
    }

    fn entries(&self) -> Vec<String> {
        self.state.read().entries.clone()
    }

    fn push(&self, feature: String) -> u64 {
        let mut state = self.state.write();
        state.entries.push(feature);
        state.generation += 1;
        state.generation
    }
}

#[derive(Debug, Default)]
struct FeatureIndex {
    /// Log generation the index was built against; `None` means untrusted
    generation: Option<u64>,
    /// Feature ids map to themselves, short-name aliases map to their feature id
    names: FxHashMap<String, String>,
}

/// Record of features loaded into the runtime
#[derive(Debug)]
pub struct FeatureRegistry {
    log: Arc<dyn FeatureLog>,
    index: Mutex<FeatureIndex>,
}

impl FeatureRegistry {
    /// Create a registry over a feature log
    pub fn new(log: Arc<dyn FeatureLog>) -> Self {
        Self {
            log,
            index: Mutex::new(FeatureIndex::default()),
        }
    }

    /// The underlying log
    pub fn log(&self) -> &Arc<dyn FeatureLog> {
        &self.log
    }

    /// Check whether `feature` (a feature id or a recorded short name) is loaded
    pub fn is_loaded(&self, feature: &str) -> bool {
        let mut index = self.index.lock();
        self.refresh(&mut index);
        index.names.contains_key(feature)
    }

    /// Append `feature` to the log and index it, along with `short_name` as an alias.
    pub fn record_loaded(&self, feature: &str, short_name: &str) {
        let mut index = self.index.lock();

        let before = self.log.generation();
        let after = self.log.push(feature.to_string());

        index.names.insert(feature.to_string(), feature.to_string());
        if !short_name.is_empty() && short_name != feature {
            index.names.insert(short_name.to_string(), feature.to_string());
        }

        // Only our own append happened since the index was built
        if index.generation == Some(before) && after == before + 1 {
            index.generation = Some(after);
        } else {
            index.generation = None;
        }
        debug!("Recorded feature {}", feature);
    }

    /// Invalidate the index if the log changed behind our back.
    /// Returns true if the index was stale.
    pub fn stale_check(&self) -> bool {
        let mut index = self.index.lock();
        let stale = index.generation != Some(self.log.generation());
        if stale {
            index.generation = None;
        }
        stale
    }

    /// Current log contents
    pub fn features(&self) -> Vec<String> {
        self.log.entries()
    }

    fn refresh(&self, index: &mut FeatureIndex) {
        // Generation is read before the entries: a mutation in between
        // leaves the index one generation behind, never falsely current
        let current = self.log.generation();
        if index.generation == Some(current) {
            return;
        }
        if index.generation.is_some() {
            warn!("Feature log modified externally, rebuilding index");
        }

        let entries = self.log.entries();
        let present: FxHashSet<&str> = entries.iter().map(String::as_str).collect();

        let mut names: FxHashMap<String, String> = index
            .names
            .drain()
            .filter(|(name, feature)| name != feature && present.contains(feature.as_str()))
            .collect();
        for feature in &entries {
            names.insert(feature.clone(), feature.clone());
        }

        index.names = names;
        index.generation = Some(current);
    }
}
