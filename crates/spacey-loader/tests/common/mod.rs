// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Test engine for the loader integration tests
//!
//! Scripts are line-oriented:
//!
//! ```text
//! require NAME
//! require_relative NAME
//! sleep MILLIS
//! fail MESSAGE
//! fail_first        # fails the first time this file runs only
//! panic
//! ```

#![allow(dead_code)]

use parking_lot::Mutex;
use spacey_loader::{
    BoxError, CodeLoader, CodeLoaderBuilder, FeatureLog, LoaderConfig, RequireStatus,
    ScriptInfo, ScriptRunner, SharedFeatureLog,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Require(String),
    RequireRelative(String),
    Sleep(u64),
    Fail(String),
    FailFirst,
    Panic,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub instrs: Vec<Instr>,
}

#[derive(Debug, Error)]
#[error("syntax error at line {line}: {text}")]
pub struct SyntaxError {
    pub line: usize,
    pub text: String,
}

pub fn compile_script(script: &ScriptInfo) -> Result<Script, BoxError> {
    let source = fs::read_to_string(&script.path)?;
    let mut instrs = Vec::new();
    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (op, arg) = line.split_once(' ').unwrap_or((line, ""));
        instrs.push(match op {
            "require" => Instr::Require(arg.to_string()),
            "require_relative" => Instr::RequireRelative(arg.to_string()),
            "sleep" => Instr::Sleep(arg.parse()?),
            "fail" => Instr::Fail(arg.to_string()),
            "fail_first" => Instr::FailFirst,
            "panic" => Instr::Panic,
            _ => {
                return Err(SyntaxError {
                    line: lineno + 1,
                    text: line.to_string(),
                }
                .into());
            }
        });
    }
    Ok(Script { instrs })
}

#[derive(Debug, Default)]
pub struct Counters {
    pub runs: Mutex<HashMap<PathBuf, usize>>,
    pub native: Mutex<Vec<(PathBuf, String)>>,
    pub nested: Mutex<Vec<(String, RequireStatus)>>,
}

impl Counters {
    fn record_run(&self, path: &Path) -> usize {
        let mut runs = self.runs.lock();
        let count = runs.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        *count
    }
}

pub struct Runner {
    loader: Weak<CodeLoader<Script>>,
    counters: Arc<Counters>,
}

impl ScriptRunner<Script> for Runner {
    fn run(&self, unit: Script, script: &ScriptInfo) -> Result<(), BoxError> {
        let run = self.counters.record_run(&script.path);
        let loader = self.loader.upgrade().ok_or("loader dropped")?;
        for instr in unit.instrs {
            match instr {
                Instr::Require(name) => {
                    let status = loader.require(&name)?;
                    self.counters.nested.lock().push((name, status));
                }
                Instr::RequireRelative(name) => {
                    let status = loader.require_relative(&name, Some(&script.path))?;
                    self.counters.nested.lock().push((name, status));
                }
                Instr::Sleep(ms) => std::thread::sleep(Duration::from_millis(ms)),
                Instr::Fail(message) => return Err(message.into()),
                Instr::FailFirst if run == 1 => return Err("first run fails".into()),
                Instr::FailFirst => {}
                Instr::Panic => panic!("script panicked"),
            }
        }
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub dir: TempDir,
    /// Canonical path of `dir`
    pub root: PathBuf,
    pub loader: Arc<CodeLoader<Script>>,
    pub counters: Arc<Counters>,
    pub log: SharedFeatureLog,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// `lib/` under a temp dir is the only load path entry; the temp dir
    /// itself is the working directory.
    pub fn with(
        configure: impl FnOnce(CodeLoaderBuilder<Script>) -> CodeLoaderBuilder<Script>,
    ) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");
        fs::create_dir_all(root.join("lib")).expect("lib dir");

        let counters = Arc::new(Counters::default());
        let log = SharedFeatureLog::new();
        let config = LoaderConfig {
            load_path: vec![root.join("lib")],
            source_extension: ".rb".to_string(),
            library_suffix: ".so".to_string(),
        };

        let loader = Arc::new_cyclic(|weak| {
            let runner = Runner {
                loader: weak.clone(),
                counters: Arc::clone(&counters),
            };
            let native_counters = Arc::clone(&counters);
            let builder = CodeLoader::builder(compile_script, runner)
                .config(config)
                .feature_log(Arc::new(log.clone()))
                .working_dir(&root)
                .native_loader(move |path: &Path, name: &str| -> Result<(), BoxError> {
                    native_counters
                        .native
                        .lock()
                        .push((path.to_path_buf(), name.to_string()));
                    Ok(())
                });
            configure(builder).build().expect("valid loader config")
        });

        Self {
            dir,
            root,
            loader,
            counters,
            log,
        }
    }

    /// Write `body` to `rel` under the temp dir, returning the absolute path
    pub fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(&path, body).expect("write fixture");
        path
    }

    pub fn lib(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn runs(&self, path: &Path) -> usize {
        self.counters.runs.lock().get(path).copied().unwrap_or(0)
    }

    pub fn feature_count(&self, path: &Path) -> usize {
        let feature = path.to_string_lossy();
        self.log
            .entries()
            .iter()
            .filter(|f| f.as_str() == feature)
            .count()
    }

    pub fn nested(&self) -> Vec<(String, RequireStatus)> {
        self.counters.nested.lock().clone()
    }
}
