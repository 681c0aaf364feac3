//! Queryable configuration resources
//!
//! Each resource pairs a grammar with the shared pipeline and parses lazily:
//! nothing is read until the first field is requested, and every later field
//! reuses that parse (or its error).
//!
//! - [`SshdConfig`]: `sshd_config` with `Include` and `Match` blocks
//! - [`Sudoers`]: `/etc/sudoers` with `@include`/`@includedir`
//! - [`Modprobe`]: `modprobe.d` directives
//! - [`PamConf`]: `pam.d` service stacks

mod modprobe;
mod pam;
mod sshd;
mod sudoers;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub use modprobe::{
    Modprobe, ModprobeAlias, ModprobeBlacklist, ModprobeCommand, ModprobeGrammar, ModprobeOption,
    ModprobeSoftdep,
};
pub use pam::{PamConf, PamEntry, PamGrammar};
pub use sshd::{SshdConfig, SshdGrammar};
pub use sudoers::{Sudoers, SudoersAlias, SudoersDefault, SudoersGrammar, SudoersUserSpec};

use crate::directive::{Diagnostic, Directive};
use crate::error::Result;
use crate::pipeline::ParsedConfig;

/// Fields every resource exposes
pub trait Resource {
    /// Stable identity, e.g. `sshd.config(/etc/ssh/sshd_config)`
    fn id(&self) -> &str;

    /// The cached pipeline output, parsing on first use
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    fn parsed(&self) -> Result<&ParsedConfig>;

    /// Contributing files in discovery order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    fn files(&self) -> Result<Vec<&Path>> {
        Ok(self.parsed()?.files())
    }

    /// All contributing content, newline separated
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    fn content(&self) -> Result<String> {
        Ok(self.parsed()?.content())
    }

    /// Hash of the ordered contributing paths
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    fn fingerprint(&self) -> Result<&str> {
        Ok(self.parsed()?.fingerprint.as_str())
    }

    /// Lines skipped while parsing
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    fn diagnostics(&self) -> Result<&[Diagnostic]> {
        Ok(&self.parsed()?.diagnostics)
    }
}

/// Where an entry was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Source file
    pub file: PathBuf,
    /// 1-based line in `file`
    pub line: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

impl From<&Directive> for Location {
    fn from(directive: &Directive) -> Self {
        Self {
            file: directive.source_file.clone(),
            line: directive.line_number,
        }
    }
}

/// Split a keyword from its value at the first whitespace or `=`
pub(crate) fn split_keyword(line: &str) -> (&str, &str) {
    let end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    (keyword, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keyword() {
        assert_eq!(split_keyword("Port 22"), ("Port", "22"));
        assert_eq!(split_keyword("Port=22"), ("Port", "22"));
        assert_eq!(split_keyword("Port = 22"), ("Port", "22"));
        assert_eq!(split_keyword("Match User a b"), ("Match", "User a b"));
        assert_eq!(split_keyword("Port"), ("Port", ""));
    }

    #[test]
    fn test_location_display() {
        let location = Location {
            file: PathBuf::from("/etc/sudoers"),
            line: 12,
        };
        assert_eq!(location.to_string(), "/etc/sudoers:12");
    }
}
