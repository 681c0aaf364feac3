//! Error types shared by every resource

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced when reconstructing a configuration
///
/// The type is `Clone` so a failed parse can be cached on the resource and
/// handed back to every later field read.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The primary or explicitly requested configuration source does not exist
    #[error("file not found: {}", path.display())]
    SourceNotFound {
        /// Path that was asked for
        path: PathBuf,
    },

    /// Any other I/O failure while reading a contributing source
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: Arc<io::Error>,
    },

    /// A line matched no directive shape in a strict grammar
    #[error("{}:{line}: {message}", file.display())]
    Grammar {
        /// File containing the line
        file: PathBuf,
        /// 1-based line number within `file`
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// A wildcard or exclusion pattern could not be compiled
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Compiler message
        message: String,
    },
}

impl Error {
    /// Map an I/O error for `path`, keeping "not found" distinguishable
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(err),
            }
        }
    }

    /// Whether this is a [`Error::SourceNotFound`]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_keeps_path() {
        let err = Error::from_io(
            Path::new("/etc/ssh/sshd_config"),
            io::Error::from(io::ErrorKind::NotFound),
        );

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "file not found: /etc/ssh/sshd_config");
    }

    #[test]
    fn test_other_io_errors_are_wrapped() {
        let err = Error::from_io(
            Path::new("/etc/sudoers"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );

        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("failed to read /etc/sudoers"));
    }

    #[test]
    fn test_grammar_error_display() {
        let err = Error::Grammar {
            file: PathBuf::from("/etc/ssh/sshd_config"),
            line: 7,
            message: "missing value for 'Port'".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "/etc/ssh/sshd_config:7: missing value for 'Port'"
        );
    }
}
