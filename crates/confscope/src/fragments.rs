//! Filtering of directory entries pulled in by directory includes
//!
//! Package managers and editors leave backup copies next to live fragments
//! (`sshd.conf.dpkg-old`, `90-custom~`, ...). Those are excluded with
//! gitignore-style patterns using the ignore crate.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Error, Result};

/// Entries never treated as live configuration fragments
pub const BACKUP_PATTERNS: &[&str] = &[
    ".*",
    "*~",
    "*.bak",
    "*.dpkg-*",
    "*.rpmsave",
    "*.rpmnew",
    "*.rpmorig",
    "*.swp",
];

/// Decides which directory entries are fragments
pub struct FragmentFilter {
    gitignore: Gitignore,
}

impl FragmentFilter {
    /// Filter excluding only [`BACKUP_PATTERNS`]
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in patterns fail to compile.
    pub fn standard() -> Result<Self> {
        Self::with_patterns(&[], &[])
    }

    /// Filter excluding [`BACKUP_PATTERNS`] plus `ignore_patterns`,
    /// re-including anything matched by `include_patterns`
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn with_patterns(ignore_patterns: &[&str], include_patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");

        for pattern in BACKUP_PATTERNS.iter().chain(ignore_patterns) {
            builder
                .add_line(None, pattern)
                .map_err(|e| invalid(pattern, &e))?;
        }

        // Include patterns are negated ignores
        for pattern in include_patterns {
            builder
                .add_line(None, &format!("!{pattern}"))
                .map_err(|e| invalid(pattern, &e))?;
        }

        let gitignore = builder.build().map_err(|e| invalid("<fragments>", &e))?;
        Ok(Self { gitignore })
    }

    /// Whether a directory entry should be read
    #[must_use]
    pub fn should_include(&self, name: &str, is_dir: bool) -> bool {
        !self.gitignore.matched(Path::new(name), is_dir).is_ignore()
    }
}

fn invalid(pattern: &str, err: &ignore::Error) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    }
}
