//! Line-oriented tokenizing of configuration files
//!
//! The parser is shared by every subsystem; each one plugs in a
//! [`DirectiveGrammar`] that knows its comment rules, include syntax and
//! line shapes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::fragments::FragmentFilter;
use crate::source::ConfigSource;

/// Shape of a parsed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectiveKind {
    /// `key value...`
    KeyValue,
    /// Opens a conditional scope, e.g. `Match User svc`
    BlockHeader,
    /// `directive arg1 arg2...` kept as a repeated entry
    ListEntry,
    /// Names further sources to merge in
    Include,
}

/// One parsed statement with its source location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    /// File the line came from
    pub source_file: PathBuf,
    /// 1-based line within `source_file`
    pub line_number: usize,
    /// Line shape
    pub kind: DirectiveKind,
    /// Logical line as written, comment removed
    pub raw: String,
    /// Grammar-specific tokens; the first is always the keyword
    pub tokens: Vec<String>,
    /// Include nesting of `source_file`; 0 for a root source
    pub depth: usize,
}

impl Directive {
    /// The leading keyword
    #[must_use]
    pub fn keyword(&self) -> &str {
        self.tokens.first().map_or("", String::as_str)
    }

    /// Tokens after the keyword
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }
}

/// A skipped line in a lenient grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// File containing the line
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Why the line was skipped
    pub message: String,
}

/// Target of an include directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeRef {
    /// One or more file paths or wildcard patterns
    Files(Vec<String>),
    /// A directory whose entries are all included
    Directory(String),
}

/// What to do with a line that matches no directive shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarPolicy {
    /// Fail the whole parse
    Strict,
    /// Skip the line and record a [`Diagnostic`]
    Lenient,
}

/// Subsystem-specific syntax plugged into the shared pipeline
pub trait DirectiveGrammar: Send + Sync {
    /// Short subsystem name used in logs
    fn name(&self) -> &'static str;

    /// Malformed line handling
    fn policy(&self) -> GrammarPolicy;

    /// Whether a trailing `\` joins a line with the next one
    fn line_continuation(&self) -> bool {
        false
    }

    /// Remove a trailing comment; the default cuts at the first `#`
    fn strip_comment<'a>(&self, line: &'a str) -> &'a str {
        line.split_once('#').map_or(line, |(head, _)| head)
    }

    /// Recognize an include directive on a trimmed logical line
    ///
    /// Called before comment stripping so `#include`-style syntax works.
    fn include(&self, line: &str) -> Option<IncludeRef>;

    /// Directory that relative include targets resolve against
    fn include_base(&self, including: &Path) -> PathBuf {
        including
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
    }

    /// Rewrite an include target before resolution (e.g. `%h` expansion)
    fn expand_include(&self, target: &str) -> String {
        target.to_string()
    }

    /// Subsystem naming rules for entries of an included directory
    fn accepts_fragment(&self, _name: &str) -> bool {
        true
    }

    /// Backup and ignore rules for entries of an included directory
    ///
    /// # Errors
    ///
    /// Returns an error if the grammar's patterns are invalid.
    fn fragment_filter(&self) -> Result<FragmentFilter> {
        FragmentFilter::standard()
    }

    /// Classify a non-empty, comment-free, trimmed line
    ///
    /// # Errors
    ///
    /// Returns a message describing why the line is malformed.
    fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String>;
}

/// A logical line: start line number and joined text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line
    pub number: usize,
    /// Trimmed text with continuations joined
    pub text: String,
}

/// Split content into trimmed logical lines, joining `\` continuations
/// when the grammar asks for it
pub fn logical_lines<G>(content: &str, grammar: &G) -> Vec<LogicalLine>
where
    G: DirectiveGrammar + ?Sized,
{
    let continuation = grammar.line_continuation();
    let mut lines = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (idx, physical) in content.lines().enumerate() {
        let trimmed = physical.trim();
        let (body, continues) = match trimmed.strip_suffix('\\') {
            Some(body) if continuation => (body.trim_end(), true),
            _ => (trimmed, false),
        };

        let line = match pending.take() {
            Some(mut open) => {
                if !body.is_empty() {
                    if !open.text.is_empty() {
                        open.text.push(' ');
                    }
                    open.text.push_str(body);
                }
                open
            }
            None => LogicalLine {
                number: idx + 1,
                text: body.to_string(),
            },
        };

        if continues {
            pending = Some(line);
        } else {
            lines.push(line);
        }
    }

    // A continuation on the last line still ends the statement
    lines.extend(pending);
    lines
}

/// Result of parsing one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    /// Directives in line order
    pub directives: Vec<Directive>,
    /// Lines skipped by a lenient grammar
    pub diagnostics: Vec<Diagnostic>,
}

/// Stateless tokenizer driven by a grammar
pub struct DirectiveParser<'g, G: ?Sized> {
    grammar: &'g G,
}

impl<'g, G: DirectiveGrammar + ?Sized> DirectiveParser<'g, G> {
    /// Create a parser for `grammar`
    #[must_use]
    pub const fn new(grammar: &'g G) -> Self {
        Self { grammar }
    }

    /// Tokenize one source
    ///
    /// # Errors
    ///
    /// Returns [`Error::Grammar`] on the first malformed line when the
    /// grammar is strict.
    pub fn parse(&self, source: &ConfigSource) -> Result<ParsedFile> {
        let mut parsed = ParsedFile::default();

        for line in logical_lines(&source.content, self.grammar) {
            if let Some(include) = self.grammar.include(&line.text) {
                let targets = match include {
                    IncludeRef::Files(targets) => targets,
                    IncludeRef::Directory(dir) => vec![dir],
                };
                let keyword = line
                    .text
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                parsed.directives.push(Directive {
                    source_file: source.path.clone(),
                    line_number: line.number,
                    kind: DirectiveKind::Include,
                    raw: line.text.clone(),
                    tokens: std::iter::once(keyword).chain(targets).collect(),
                    depth: 0,
                });
                continue;
            }

            let text = self.grammar.strip_comment(&line.text).trim();
            if text.is_empty() {
                continue;
            }

            match self.grammar.classify(text) {
                Ok((kind, tokens)) => parsed.directives.push(Directive {
                    source_file: source.path.clone(),
                    line_number: line.number,
                    kind,
                    raw: text.to_string(),
                    tokens,
                    depth: 0,
                }),
                Err(message) => match self.grammar.policy() {
                    GrammarPolicy::Strict => {
                        return Err(Error::Grammar {
                            file: source.path.clone(),
                            line: line.number,
                            message,
                        });
                    }
                    GrammarPolicy::Lenient => {
                        warn!(
                            grammar = self.grammar.name(),
                            file = %source.path.display(),
                            line = line.number,
                            "skipping line: {message}"
                        );
                        parsed.diagnostics.push(Diagnostic {
                            file: source.path.clone(),
                            line: line.number,
                            message,
                        });
                    }
                },
            }
        }

        trace!(
            file = %source.path.display(),
            directives = parsed.directives.len(),
            "parsed source"
        );
        Ok(parsed)
    }
}
