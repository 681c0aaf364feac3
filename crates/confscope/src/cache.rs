//! Per-resource memoization of the parse pipeline

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::Result;

/// Lifecycle of a cached parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Nothing has been requested yet
    Unparsed,
    /// The first caller is running the pipeline
    Parsing,
    /// The pipeline succeeded; the value is cached
    Parsed,
    /// The pipeline failed; the error is cached
    Failed,
}

const UNPARSED: u8 = 0;
const PARSING: u8 = 1;
const PARSED: u8 = 2;
const FAILED: u8 = 3;

/// One-shot cell holding the outcome of a resource's parse
///
/// The first caller runs the pipeline; concurrent callers block until it is
/// done and then observe the same outcome. Failures are sticky.
#[derive(Debug)]
pub struct ParseCache<T> {
    cell: OnceLock<Result<T>>,
    state: AtomicU8,
}

impl<T> ParseCache<T> {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            state: AtomicU8::new(UNPARSED),
        }
    }

    /// Return the cached value, running `parse` on first use
    ///
    /// # Errors
    ///
    /// Returns the (cached) error of the first parse attempt.
    pub fn get_or_parse<F>(&self, parse: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.cell
            .get_or_init(|| {
                self.state.store(PARSING, Ordering::SeqCst);
                let outcome = parse();
                let state = if outcome.is_ok() { PARSED } else { FAILED };
                self.state.store(state, Ordering::SeqCst);
                outcome
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Run `parse` if it has not run yet, discarding the value
    ///
    /// # Errors
    ///
    /// Returns the (cached) error of the first parse attempt.
    pub fn ensure_parsed<F>(&self, parse: F) -> Result<()>
    where
        F: FnOnce() -> Result<T>,
    {
        self.get_or_parse(parse).map(|_| ())
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ParseState {
        match self.state.load(Ordering::SeqCst) {
            UNPARSED => ParseState::Unparsed,
            PARSING => ParseState::Parsing,
            PARSED => ParseState::Parsed,
            _ => ParseState::Failed,
        }
    }
}

impl<T> Default for ParseCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_parses_once() {
        let cache = ParseCache::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_parse(|| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), ParseState::Parsed);
    }

    #[test]
    fn test_failure_is_sticky() {
        let cache: ParseCache<u32> = ParseCache::new();
        assert_eq!(cache.state(), ParseState::Unparsed);

        let first = cache
            .get_or_parse(|| {
                Err(Error::SourceNotFound {
                    path: PathBuf::from("/etc/ssh/sshd_config"),
                })
            })
            .unwrap_err();
        let second = cache.get_or_parse(|| Ok(1)).unwrap_err();

        assert!(first.is_not_found());
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(cache.state(), ParseState::Failed);
    }

    #[test]
    fn test_state_is_parsing_inside_pipeline() {
        let cache: ParseCache<ParseState> = ParseCache::new();
        let seen = cache.get_or_parse(|| Ok(cache.state())).unwrap();

        assert_eq!(*seen, ParseState::Parsing);
    }

    #[test]
    fn test_concurrent_callers_share_one_parse() {
        let cache = Arc::new(ParseCache::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    cache
                        .ensure_parsed(|| {
                            runs.fetch_add(1, Ordering::SeqCst);
                            Ok(String::from("parsed"))
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), ParseState::Parsed);
    }
}
