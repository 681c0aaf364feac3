//! Segment-by-segment wildcard expansion over a [`FileSystem`]

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::source::normalize;

/// Whether a path or segment contains a shell wildcard
#[must_use]
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expands include patterns such as `sshd_config.d/*.conf`
pub struct GlobExpander<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> GlobExpander<'a> {
    /// Create an expander listing directories through `fs`
    #[must_use]
    pub const fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Expand `pattern` into a sorted, de-duplicated list of absolute paths
    ///
    /// Patterns without wildcards yield exactly one path, which may not
    /// exist. A directory that cannot be listed contributes nothing, so a
    /// pattern matching nothing yields an empty list rather than an error.
    /// A wildcard in the last segment only matches non-directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a wildcard segment is not a valid pattern.
    pub fn expand(&self, pattern: &str, base: &Path) -> Result<Vec<PathBuf>> {
        let joined = base.join(pattern);
        let absolute = normalize(&joined);

        if !has_wildcard(pattern) {
            return Ok(vec![absolute]);
        }

        let components: Vec<Component<'_>> = absolute.components().collect();
        let mut prefixes = vec![PathBuf::new()];
        for (idx, component) in components.iter().enumerate() {
            let segment = component.as_os_str().to_string_lossy();
            prefixes = match component {
                Component::Normal(_) if has_wildcard(&segment) => {
                    let matcher = compile(&segment)?;
                    let files_only = idx + 1 == components.len();
                    self.list_matching(&prefixes, &matcher, files_only)
                }
                _ => prefixes
                    .into_iter()
                    .map(|prefix| prefix.join(component))
                    .collect(),
            };

            if prefixes.is_empty() {
                break;
            }
        }

        prefixes.sort();
        prefixes.dedup();
        Ok(prefixes)
    }

    fn list_matching(
        &self,
        prefixes: &[PathBuf],
        matcher: &GlobMatcher,
        files_only: bool,
    ) -> Vec<PathBuf> {
        let mut next = Vec::new();
        for prefix in prefixes {
            match self.fs.read_dir(prefix) {
                Ok(entries) => next.extend(
                    entries
                        .into_iter()
                        .filter(|entry| !(files_only && entry.is_dir))
                        .filter(|entry| matcher.is_match(&entry.name))
                        .map(|entry| prefix.join(entry.name)),
                ),
                Err(e) => {
                    debug!(dir = %prefix.display(), error = %e, "glob branch has no listing");
                }
            }
        }
        next
    }
}

fn compile(segment: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(segment)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::InvalidPattern {
            pattern: segment.to_string(),
            message: e.to_string(),
        })
}
