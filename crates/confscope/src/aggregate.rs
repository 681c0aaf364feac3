//! Include-aware collection of every file contributing to a configuration
//!
//! The walk is depth-first in include order: an included file is read right
//! after the file that includes it, before the includer's later includes.
//! That order is the precedence order used when flattening.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::directive::{DirectiveGrammar, IncludeRef, logical_lines};
use crate::error::{Error, Result};
use crate::fragments::FragmentFilter;
use crate::fs::FileSystem;
use crate::glob::{GlobExpander, has_wildcard};
use crate::source::{ConfigSource, DiscoveredVia, IncludeSite, SourceSpec, normalize};

/// A path waiting on the worklist
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    path: PathBuf,
    via: DiscoveredVia,
    origin: Option<IncludeSite>,
}

/// Collects the ordered, de-duplicated source set of a resource
pub struct IncludeAggregator<'a, G: ?Sized> {
    fs: &'a dyn FileSystem,
    grammar: &'a G,
}

impl<'a, G: DirectiveGrammar + ?Sized> IncludeAggregator<'a, G> {
    /// Aggregator reading through `fs` with `grammar`'s include syntax
    #[must_use]
    pub const fn new(fs: &'a dyn FileSystem, grammar: &'a G) -> Self {
        Self { fs, grammar }
    }

    /// Read the root source and everything it includes
    ///
    /// A root that is a directory contributes its accepted entries in
    /// lexicographic order. Missing include targets are skipped; files
    /// already read are never read again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceNotFound`] if the root does not exist, and
    /// [`Error::Io`] for other read failures.
    pub fn collect(&self, spec: &SourceSpec) -> Result<Vec<ConfigSource>> {
        let filter = self.grammar.fragment_filter()?;
        let root = normalize(&spec.path);
        let info = self
            .fs
            .stat(&root)
            .map_err(|e| Error::from_io(&root, e))?;

        let mut worklist = if info.is_dir {
            let entries = self
                .fragments(&root, &filter)
                .map_err(|e| Error::from_io(&root, e))?;
            entries
                .into_iter()
                .map(|path| Pending {
                    path,
                    via: DiscoveredVia::DirectoryScan,
                    origin: None,
                })
                .collect()
        } else {
            vec![Pending {
                path: root,
                via: DiscoveredVia::Primary,
                origin: None,
            }]
        };
        // Stack: the next path to read sits at the end
        worklist.reverse();

        let mut visited = HashSet::new();
        let mut sources = Vec::new();

        while let Some(pending) = worklist.pop() {
            if !visited.insert(pending.path.clone()) {
                debug!(path = %pending.path.display(), "already collected, skipping");
                continue;
            }

            let content = match self.fs.read_to_string(&pending.path) {
                Ok(content) => content,
                Err(e) if pending.via == DiscoveredVia::Primary => {
                    return Err(Error::from_io(&pending.path, e));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %pending.path.display(), "include target unavailable");
                    continue;
                }
                Err(e) => return Err(Error::from_io(&pending.path, e)),
            };

            debug!(
                grammar = self.grammar.name(),
                path = %pending.path.display(),
                via = ?pending.via,
                "collected source"
            );

            let index = sources.len();
            let mut includes = self.includes(&pending.path, &content, index, &filter)?;
            includes.reverse();
            worklist.extend(includes);

            sources.push(ConfigSource {
                path: pending.path,
                content,
                discovered_via: pending.via,
                origin: pending.origin,
            });
        }

        Ok(sources)
    }

    /// Include targets of one file, in directive order
    fn includes(
        &self,
        path: &Path,
        content: &str,
        index: usize,
        filter: &FragmentFilter,
    ) -> Result<Vec<Pending>> {
        let base = self.grammar.include_base(path);
        let mut targets = Vec::new();

        for line in logical_lines(content, self.grammar) {
            let Some(include) = self.grammar.include(&line.text) else {
                continue;
            };
            let origin = Some(IncludeSite {
                parent: index,
                line: line.number,
            });

            match include {
                IncludeRef::Files(patterns) => {
                    for pattern in patterns {
                        let pattern = self.grammar.expand_include(&pattern);
                        if has_wildcard(&pattern) {
                            let matches = GlobExpander::new(self.fs).expand(&pattern, &base)?;
                            if matches.is_empty() {
                                debug!(pattern = %pattern, "include pattern matched nothing");
                            }
                            targets.extend(matches.into_iter().map(|path| Pending {
                                path,
                                via: DiscoveredVia::Glob,
                                origin,
                            }));
                        } else {
                            targets.push(Pending {
                                path: normalize(&base.join(&pattern)),
                                via: DiscoveredVia::Include,
                                origin,
                            });
                        }
                    }
                }
                IncludeRef::Directory(dir) => {
                    let dir = normalize(&base.join(self.grammar.expand_include(&dir)));
                    match self.fragments(&dir, filter) {
                        Ok(entries) => targets.extend(entries.into_iter().map(|path| Pending {
                            path,
                            via: DiscoveredVia::DirectoryScan,
                            origin,
                        })),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            debug!(dir = %dir.display(), "include directory unavailable");
                        }
                        Err(e) => {
                            warn!(dir = %dir.display(), error = %e, "cannot list include directory");
                        }
                    }
                }
            }
        }

        Ok(targets)
    }

    /// Accepted file entries of a directory, sorted by path
    fn fragments(&self, dir: &Path, filter: &FragmentFilter) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .fs
            .read_dir(dir)?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter(|entry| filter.should_include(&entry.name, false))
            .filter(|entry| self.grammar.accepts_fragment(&entry.name))
            .map(|entry| dir.join(entry.name))
            .collect();
        paths.sort();
        Ok(paths)
    }
}
