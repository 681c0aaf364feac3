//! The shared discovery and parse pipeline behind every resource

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::aggregate::IncludeAggregator;
use crate::directive::{Diagnostic, Directive, DirectiveGrammar, DirectiveKind, DirectiveParser};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::source::{ConfigSource, SourceSpec};

/// Everything read and tokenized for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    /// Contributing files in discovery order
    pub sources: Vec<ConfigSource>,
    /// Directives with includes spliced in at the including line
    pub directives: Vec<Directive>,
    /// Lines skipped by a lenient grammar
    pub diagnostics: Vec<Diagnostic>,
    /// SHA-256 over the ordered source paths, hex encoded
    pub fingerprint: String,
}

impl ParsedConfig {
    /// Contributing file paths in discovery order
    #[must_use]
    pub fn files(&self) -> Vec<&Path> {
        self.sources.iter().map(|s| s.path.as_path()).collect()
    }

    /// Raw text of every source, in discovery order, newline separated
    #[must_use]
    pub fn content(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Discovery, aggregation and tokenizing for one grammar
pub struct Pipeline<G> {
    fs: Arc<dyn FileSystem>,
    spec: SourceSpec,
    grammar: G,
}

impl<G: DirectiveGrammar> Pipeline<G> {
    /// Pipeline reading `spec` through `fs`
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, spec: SourceSpec, grammar: G) -> Self {
        Self { fs, spec, grammar }
    }

    /// Root source
    #[must_use]
    pub const fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Grammar in use
    #[must_use]
    pub const fn grammar(&self) -> &G {
        &self.grammar
    }

    /// Collect, parse and splice every contributing source
    ///
    /// # Errors
    ///
    /// Returns an error if the root source is missing or unreadable, or if
    /// a strict grammar rejects a line.
    pub fn run(&self) -> Result<ParsedConfig> {
        let sources = IncludeAggregator::new(self.fs.as_ref(), &self.grammar).collect(&self.spec)?;

        let parser = DirectiveParser::new(&self.grammar);
        let mut per_file = Vec::with_capacity(sources.len());
        let mut diagnostics = Vec::new();
        for source in &sources {
            let parsed = parser.parse(source)?;
            diagnostics.extend(parsed.diagnostics);
            per_file.push(parsed.directives);
        }

        let directives = splice(&sources, &per_file);
        let fingerprint = fingerprint(&sources);

        debug!(
            grammar = self.grammar.name(),
            root = %self.spec.path.display(),
            files = sources.len(),
            directives = directives.len(),
            "pipeline complete"
        );

        Ok(ParsedConfig {
            sources,
            directives,
            diagnostics,
            fingerprint,
        })
    }
}

/// Lay out directives as if every include were replaced by the included
/// file's content, tagging each with the include depth of its file
fn splice(sources: &[ConfigSource], per_file: &[Vec<Directive>]) -> Vec<Directive> {
    let mut children: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, source) in sources.iter().enumerate() {
        match source.origin {
            Some(site) => children.entry((site.parent, site.line)).or_default().push(idx),
            None => roots.push(idx),
        }
    }

    let mut out = Vec::new();
    // (file index, next directive position)
    let mut stack: Vec<(usize, usize)> = roots.into_iter().rev().map(|idx| (idx, 0)).collect();
    while let Some((file, pos)) = stack.pop() {
        let Some(directive) = per_file[file].get(pos) else {
            continue;
        };
        stack.push((file, pos + 1));
        out.push(Directive {
            depth: include_depth(sources, file),
            ..directive.clone()
        });

        if directive.kind == DirectiveKind::Include {
            if let Some(included) = children.get(&(file, directive.line_number)) {
                stack.extend(included.iter().rev().map(|&idx| (idx, 0)));
            }
        }
    }
    out
}

fn include_depth(sources: &[ConfigSource], idx: usize) -> usize {
    let mut depth = 0;
    let mut origin = sources[idx].origin;
    while let Some(site) = origin {
        depth += 1;
        origin = sources[site.parent].origin;
    }
    depth
}

fn fingerprint(sources: &[ConfigSource]) -> String {
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(source.path.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{GrammarPolicy, IncludeRef};
    use crate::fs::MemoryFs;
    use std::path::PathBuf;

    struct Lines;

    impl DirectiveGrammar for Lines {
        fn name(&self) -> &'static str {
            "lines"
        }

        fn policy(&self) -> GrammarPolicy {
            GrammarPolicy::Lenient
        }

        fn include(&self, line: &str) -> Option<IncludeRef> {
            line.strip_prefix("include ")
                .map(|rest| IncludeRef::Files(vec![rest.trim().to_string()]))
        }

        fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String> {
            if line == "bad" {
                return Err("bad line".to_string());
            }
            Ok((DirectiveKind::ListEntry, vec![line.to_string()]))
        }
    }

    fn pipeline(fs: MemoryFs, root: &str) -> Pipeline<Lines> {
        Pipeline::new(
            Arc::new(fs),
            SourceSpec {
                path: PathBuf::from(root),
            },
            Lines,
        )
    }

    fn keywords(parsed: &ParsedConfig) -> Vec<&str> {
        parsed
            .directives
            .iter()
            .filter(|d| d.kind != DirectiveKind::Include)
            .map(Directive::keyword)
            .collect()
    }

    #[test]
    fn test_includes_are_spliced_in_place() {
        let fs = MemoryFs::new()
            .with_file("/etc/a", "a1\ninclude b\na2\ninclude c\na3\n")
            .with_file("/etc/b", "b1\ninclude c\n")
            .with_file("/etc/c", "c1\n");

        let parsed = pipeline(fs, "/etc/a").run().unwrap();

        assert_eq!(parsed.files(), [Path::new("/etc/a"), Path::new("/etc/b"), Path::new("/etc/c")]);
        // c is spliced once, where it was first included
        assert_eq!(keywords(&parsed), ["a1", "b1", "c1", "a2", "a3"]);

        let depths: Vec<_> = parsed.directives.iter().map(|d| d.depth).collect();
        // a1, include b, b1, include c, c1, a2, include c, a3
        assert_eq!(depths, [0, 0, 1, 1, 2, 0, 0, 0]);
    }

    #[test]
    fn test_content_joins_sources() {
        let fs = MemoryFs::new()
            .with_file("/etc/a", "a1\ninclude b")
            .with_file("/etc/b", "b1");

        let parsed = pipeline(fs, "/etc/a").run().unwrap();

        assert_eq!(parsed.content(), "a1\ninclude b\nb1");
    }

    #[test]
    fn test_diagnostics_are_collected() {
        let fs = MemoryFs::new()
            .with_file("/etc/a", "ok\ninclude b\n")
            .with_file("/etc/b", "bad\n");

        let parsed = pipeline(fs, "/etc/a").run().unwrap();

        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].file, PathBuf::from("/etc/b"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_path_sensitive() {
        let make = || {
            MemoryFs::new()
                .with_file("/etc/a", "include b\n")
                .with_file("/etc/b", "")
        };

        let first = pipeline(make(), "/etc/a").run().unwrap();
        let second = pipeline(make(), "/etc/a").run().unwrap();
        let other = pipeline(make(), "/etc/b").run().unwrap();

        assert_eq!(first.fingerprint.len(), 64);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.directives, second.directives);
        assert_ne!(first.fingerprint, other.fingerprint);
    }
}
