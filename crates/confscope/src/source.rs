//! Source location: where a configuration starts and what was read

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// How a source entered the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveredVia {
    /// The root file of the resource
    Primary,
    /// A literal include directive
    Include,
    /// A wildcard include directive
    Glob,
    /// An entry of a scanned directory
    DirectoryScan,
}

/// Include directive that first pulled a source in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeSite {
    /// Index of the including source in the aggregate
    pub parent: usize,
    /// 1-based line of the include directive in the parent
    pub line: usize,
}

/// Initial configuration source of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Absolute, normalized path (file or directory)
    pub path: PathBuf,
}

/// One contributing file, immutable once read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSource {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Raw file content
    pub content: String,
    /// How the file was discovered
    pub discovered_via: DiscoveredVia,
    /// Include directive that discovered it; `None` for top-level sources
    #[serde(skip)]
    pub origin: Option<IncludeSite>,
}

/// Decides what a resource should read first
///
/// No filesystem access happens here; a missing path is only noticed when
/// the aggregator tries to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    /// Relative paths will be resolved against `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Pick the explicit path when given, the default otherwise
    #[must_use]
    pub fn resolve(&self, default_path: &Path, explicit: Option<&Path>) -> SourceSpec {
        SourceSpec {
            path: self.absolutize(explicit.unwrap_or(default_path)),
        }
    }

    /// Join a relative path onto the base directory and normalize it
    #[must_use]
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.base_dir.join(path))
        }
    }
}

/// Lexically remove `.` and resolve `..` components
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
