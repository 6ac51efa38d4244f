// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Name to file resolution for `require` and `load`
//!
//! - `~` and `~user` prefixes expand to home directories
//! - qualified names (`/abs`, `./rel`, `../rel`) are checked directly
//! - anything else is searched for in the [`LoadPath`], first match wins
//! - in `require` mode a bare name tries the source extension before the
//!   native library suffix in each directory

use crate::config::{GENERIC_LIBRARY_SUFFIX, LoaderConfig};
use crate::load_path::LoadPath;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Kind of loadable unit a name resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Source file, compiled then run
    Source,
    /// Native extension library
    NativeLibrary,
    /// Unit supplied by the precompiled cache
    PrecompiledCache,
}

/// How a name is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// `require`: extension optional, recognized extensions select the kind
    Require,
    /// `load`: the name is used as given, any extension, always a source file
    Load,
}

/// A resolved, loadable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute, lexically normalized path
    pub canonical_path: PathBuf,
    /// Kind of unit
    pub kind: TargetKind,
    /// Identifier recorded in the feature log
    pub feature: String,
    /// The requested file name with its resolved extension (e.g. `json.rb`)
    pub short_name: String,
}

impl ResolvedTarget {
    fn new(short_name: String, path: PathBuf, kind: TargetKind) -> Self {
        Self {
            feature: path.to_string_lossy().into_owned(),
            canonical_path: path,
            kind,
            short_name,
        }
    }

    pub(crate) fn precompiled(short_name: String, path: PathBuf) -> Self {
        Self::new(short_name, path, TargetKind::PrecompiledCache)
    }

    /// Extension module name: the file name without the library suffix
    pub fn module_name(&self, library_suffix: &str) -> String {
        let file = self
            .canonical_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file.strip_suffix(library_suffix) {
            Some(stem) => stem.to_string(),
            None => file,
        }
    }
}

/// Source and native extensions recognized by `require`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions {
    /// Source file extension (e.g. `.rb`)
    pub source: String,
    /// Platform native library suffix (e.g. `.so`, `.dylib`)
    pub library: String,
}

impl Extensions {
    /// Build from loader configuration
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            source: config.source_extension.clone(),
            library: config.library_suffix.clone(),
        }
    }

    /// Classify a requested name by its extension.
    ///
    /// A trailing `.so` is rewritten to the platform library suffix. Names
    /// without a recognized extension come back with no kind.
    pub fn classify<'a>(&self, name: &'a str) -> (Cow<'a, str>, Option<TargetKind>) {
        if name.ends_with(&self.source) {
            (Cow::Borrowed(name), Some(TargetKind::Source))
        } else if name.ends_with(&self.library) {
            (Cow::Borrowed(name), Some(TargetKind::NativeLibrary))
        } else if let Some(stem) = name.strip_suffix(GENERIC_LIBRARY_SUFFIX) {
            (
                Cow::Owned(format!("{}{}", stem, self.library)),
                Some(TargetKind::NativeLibrary),
            )
        } else {
            (Cow::Borrowed(name), None)
        }
    }

    /// The feature name a `require` of `name` would be recorded under when
    /// it is found without searching: the name itself if it carries a
    /// recognized extension, otherwise the name plus the source extension.
    pub fn provided_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self.classify(name) {
            (name, Some(_)) => name,
            (name, None) => Cow::Owned(format!("{}{}", name, self.source)),
        }
    }
}

/// Resolves requested names to loadable files
#[derive(Debug, Clone)]
pub struct PathResolver {
    load_path: LoadPath,
    extensions: Extensions,
    working_dir: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver over a shared search path
    pub fn new(load_path: LoadPath, extensions: Extensions) -> Self {
        Self {
            load_path,
            extensions,
            working_dir: None,
        }
    }

    /// Resolve relative names against `dir` instead of the process working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The shared search path
    pub fn load_path(&self) -> &LoadPath {
        &self.load_path
    }

    /// Recognized extensions
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Resolve `name`, or `None` if nothing loadable matches
    pub fn resolve(&self, name: &str, mode: ResolveMode) -> Option<ResolvedTarget> {
        let resolved = match mode {
            ResolveMode::Load => self.verify_load_path(name, true, TargetKind::Source),
            ResolveMode::Require => match self.extensions.classify(name) {
                (request, Some(kind)) => self.verify_load_path(&request, false, kind),
                (request, None) => self.verify_require_path(&request),
            },
        };

        match &resolved {
            Some(target) => debug!(
                "Resolved '{}' to {} ({:?})",
                name,
                target.canonical_path.display(),
                target.kind
            ),
            None => debug!("Could not resolve '{}' ({:?})", name, mode),
        }
        resolved
    }

    /// Absolute form of `path`, relative to the working directory
    pub fn expand(&self, path: &Path) -> PathBuf {
        expand_path(path, &self.working_dir())
    }

    /// Name used as given, no extension appended. `loading` enables the
    /// `./name` fallback that `load` has and `require` does not.
    fn verify_load_path(
        &self,
        name: &str,
        loading: bool,
        kind: TargetKind,
    ) -> Option<ResolvedTarget> {
        let file = expand_home(name)?;

        if is_qualified(&file) {
            let path = self.expand(Path::new(&*file));
            return is_loadable(&path)
                .then(|| ResolvedTarget::new(file.into_owned(), path, kind));
        }

        let path = self.search_load_path(&file, loading)?;
        Some(ResolvedTarget::new(file.into_owned(), path, kind))
    }

    fn search_load_path(&self, name: &str, loading: bool) -> Option<PathBuf> {
        let mut index = 0;
        while let Some(dir) = self.load_path.get(index) {
            let path = self.expand(&dir.join(name));
            if is_loadable(&path) {
                return Some(path);
            }
            index += 1;
        }

        if loading {
            let path = self.expand(Path::new(name));
            if is_loadable(&path) {
                return Some(path);
            }
        }

        None
    }

    /// Bare name without a recognized extension: try source, then library.
    fn verify_require_path(&self, name: &str) -> Option<ResolvedTarget> {
        let name = expand_home(name)?;

        if is_qualified(&name) {
            return self
                .check_file(&name, TargetKind::Source)
                .or_else(|| self.check_file(&name, TargetKind::NativeLibrary));
        }

        self.search_require_path(&name)
    }

    fn check_file(&self, name: &str, kind: TargetKind) -> Option<ResolvedTarget> {
        let file = format!("{}{}", name, self.extension_for(kind));
        let path = self.expand(Path::new(&file));
        is_loadable(&path).then(|| ResolvedTarget::new(file, path, kind))
    }

    fn search_require_path(&self, name: &str) -> Option<ResolvedTarget> {
        let mut index = 0;
        while let Some(dir) = self.load_path.get(index) {
            for kind in [TargetKind::Source, TargetKind::NativeLibrary] {
                let file = format!("{}{}", name, self.extension_for(kind));
                let path = self.expand(&dir.join(&file));
                if is_loadable(&path) {
                    return Some(ResolvedTarget::new(file, path, kind));
                }
            }
            index += 1;
        }
        None
    }

    fn extension_for(&self, kind: TargetKind) -> &str {
        match kind {
            TargetKind::NativeLibrary => &self.extensions.library,
            TargetKind::Source | TargetKind::PrecompiledCache => &self.extensions.source,
        }
    }

    fn working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }
}

/// True for names beginning with `~`
pub fn is_home_relative(name: &str) -> bool {
    name.starts_with('~')
}

/// True for absolute names and explicit `./` / `../` relative names
pub fn is_qualified(name: &str) -> bool {
    name.starts_with('/')
        || name.starts_with("./")
        || name.starts_with("../")
        || (cfg!(windows) && name.chars().nth(1) == Some(':'))
}

/// Expand a leading `~` or `~user`. Other names are returned unchanged.
/// Returns `None` when the home directory cannot be determined.
pub fn expand_home(name: &str) -> Option<Cow<'_, str>> {
    let Some(rest) = name.strip_prefix('~') else {
        return Some(Cow::Borrowed(name));
    };

    let (user, tail) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    let home = if user.is_empty() {
        dirs::home_dir()
    } else {
        user_home(user)
    };
    let Some(home) = home else {
        debug!("No home directory for '{}'", name);
        return None;
    };

    let expanded = if tail.is_empty() { home } else { home.join(tail) };
    Some(Cow::Owned(expanded.to_string_lossy().into_owned()))
}

#[cfg(unix)]
fn user_home(user: &str) -> Option<PathBuf> {
    nix::unistd::User::from_name(user)
        .ok()
        .flatten()
        .map(|u| u.dir)
}

#[cfg(not(unix))]
fn user_home(_user: &str) -> Option<PathBuf> {
    None
}

/// Make `path` absolute against `base` and remove `.` and `..` components
/// without touching the filesystem.
pub fn expand_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` exists, is a regular file, and is readable.
pub fn is_loadable(path: &Path) -> bool {
    let loadable = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => is_readable(path),
        _ => false,
    };
    trace!("Probe {} -> {}", path.display(), loadable);
    loadable
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::R_OK).is_ok()
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    std::fs::File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn exts() -> Extensions {
        Extensions {
            source: ".rb".to_string(),
            library: ".so".to_string(),
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "").unwrap();
        path
    }

    fn resolver(dirs: &[&Path], cwd: &Path) -> PathResolver {
        let load_path = LoadPath::new(dirs.iter().map(|d| d.to_path_buf()).collect());
        PathResolver::new(load_path, exts()).with_working_dir(cwd)
    }

    #[test]
    fn test_is_qualified() {
        assert!(is_qualified("/abs/x.rb"));
        assert!(is_qualified("./x"));
        assert!(is_qualified("../x"));
        assert!(!is_qualified("x"));
        assert!(!is_qualified(".x"));
        assert!(!is_qualified("~/x"));
    }

    #[test]
    fn test_expand_path() {
        let base = Path::new("/srv/app");
        assert_eq!(expand_path(Path::new("./lib/../x.rb"), base), PathBuf::from("/srv/app/x.rb"));
        assert_eq!(expand_path(Path::new("../x.rb"), base), PathBuf::from("/srv/x.rb"));
        assert_eq!(expand_path(Path::new("/a/./b"), base), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("lib/x").as_deref(), Some("lib/x"));
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/x.rb").unwrap();
            assert_eq!(PathBuf::from(expanded.as_ref()), home.join("x.rb"));
        }
        assert!(expand_home("~no_such_user_spacey_loader/x").is_none());
    }

    #[test]
    fn test_classify_generic_so_alias() {
        let ext = Extensions {
            source: ".rb".to_string(),
            library: ".dylib".to_string(),
        };
        assert_eq!(ext.classify("a.rb"), (Cow::Borrowed("a.rb"), Some(TargetKind::Source)));
        assert_eq!(
            ext.classify("openssl.so").0.as_ref(),
            "openssl.dylib"
        );
        assert_eq!(ext.classify("openssl.so").1, Some(TargetKind::NativeLibrary));
        assert_eq!(ext.classify("json").1, None);
        assert_eq!(ext.provided_name("json"), "json.rb");
        assert_eq!(ext.provided_name("openssl.so"), "openssl.dylib");
    }

    #[test]
    fn test_source_beats_library_in_same_directory() {
        let d1 = TempDir::new().unwrap();
        touch(d1.path(), "foo.so");
        let rb = touch(d1.path(), "foo.rb");
        let target = resolver(&[d1.path()], d1.path())
            .resolve("foo", ResolveMode::Require)
            .unwrap();
        assert_eq!(target.canonical_path, rb);
        assert_eq!(target.kind, TargetKind::Source);
        assert_eq!(target.short_name, "foo.rb");
    }

    #[test]
    fn test_first_directory_match_wins() {
        let d1 = TempDir::new().unwrap();
        let d2 = TempDir::new().unwrap();
        let lib = touch(d1.path(), "foo.so");
        touch(d2.path(), "foo.rb");
        let target = resolver(&[d1.path(), d2.path()], d1.path())
            .resolve("foo", ResolveMode::Require)
            .unwrap();
        assert_eq!(target.canonical_path, lib);
        assert_eq!(target.kind, TargetKind::NativeLibrary);
        assert_eq!(target.module_name(".so"), "foo");
    }

    #[test]
    fn test_later_directory_when_first_has_no_candidate() {
        let d1 = TempDir::new().unwrap();
        let d2 = TempDir::new().unwrap();
        let rb = touch(d2.path(), "foo.rb");
        let target = resolver(&[d1.path(), d2.path()], d1.path())
            .resolve("foo", ResolveMode::Require)
            .unwrap();
        assert_eq!(target.canonical_path, rb);
        assert_eq!(target.feature, rb.to_string_lossy());
    }

    #[test]
    fn test_explicit_extension_does_not_append() {
        let d1 = TempDir::new().unwrap();
        touch(d1.path(), "foo.rb.rb");
        let r = resolver(&[d1.path()], d1.path());
        assert!(r.resolve("foo.rb", ResolveMode::Require).is_none());
    }

    #[test]
    fn test_qualified_path_ignores_load_path() {
        let lib = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        touch(lib.path(), "x.rb");
        let r = resolver(&[lib.path()], cwd.path());
        assert!(r.resolve("./x.rb", ResolveMode::Require).is_none());
        assert!(r.resolve("./x", ResolveMode::Require).is_none());

        let local = touch(cwd.path(), "x.rb");
        let target = r.resolve("./x", ResolveMode::Require).unwrap();
        assert_eq!(target.canonical_path, local);

        let abs = local.to_string_lossy().into_owned();
        let target = r.resolve(&abs, ResolveMode::Require).unwrap();
        assert_eq!(target.canonical_path, local);
    }

    #[test]
    fn test_directories_are_not_loadable() {
        let d1 = TempDir::new().unwrap();
        fs::create_dir(d1.path().join("foo.rb")).unwrap();
        let r = resolver(&[d1.path()], d1.path());
        assert!(r.resolve("foo", ResolveMode::Require).is_none());
    }

    #[test]
    fn test_load_mode_any_extension_and_cwd_fallback() {
        let lib = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        touch(lib.path(), "config.txt");
        let local = touch(cwd.path(), "setup.conf");
        let r = resolver(&[lib.path()], cwd.path());

        let target = r.resolve("config.txt", ResolveMode::Load).unwrap();
        assert_eq!(target.kind, TargetKind::Source);
        assert_eq!(target.canonical_path, lib.path().join("config.txt"));

        // no extension search for load
        assert!(r.resolve("config", ResolveMode::Load).is_none());

        assert_eq!(r.resolve("setup.conf", ResolveMode::Load).unwrap().canonical_path, local);
        assert!(r.resolve("setup.conf", ResolveMode::Require).is_none());
    }

    #[test]
    fn test_load_path_mutation_is_visible() {
        let d1 = TempDir::new().unwrap();
        let rb = touch(d1.path(), "late.rb");
        let r = resolver(&[], d1.path());
        assert!(r.resolve("late", ResolveMode::Require).is_none());
        r.load_path().push(d1.path());
        assert_eq!(r.resolve("late", ResolveMode::Require).unwrap().canonical_path, rb);
    }
}
