//! Tool settings: where to look and how to resolve host-specific names
//!
//! This module handles:
//! - Settings file discovery from multiple locations
//! - TOML parsing with serde
//! - Merging with precedence rules
//! - Validation and error reporting

mod discovery;
mod merge;
mod types;
mod validation;

pub use discovery::{SettingsDiscovery, SettingsFiles};
pub use merge::SettingsMerger;
pub use types::{Settings, SubsystemPaths};
pub use validation::SettingsValidator;

use std::path::Path;

use anyhow::Result;

/// Coordinates discovery, parsing, merging, and validation
pub struct SettingsManager;

impl SettingsManager {
    /// Load and merge settings from all sources
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit settings path is missing, or if any
    /// discovered file is unreadable, malformed, or invalid.
    pub fn load(cli_path: Option<&Path>) -> Result<Settings> {
        if let Some(path) = cli_path {
            if !path.is_file() {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
        }

        let files = SettingsDiscovery::discover(cli_path);
        Self::load_files(&files)
    }

    /// Merge and validate an already discovered set of files
    ///
    /// # Errors
    ///
    /// Returns an error if a file is unreadable, malformed, or invalid.
    pub fn load_files(files: &SettingsFiles) -> Result<Settings> {
        let merged = SettingsMerger::merge(files)?;
        SettingsValidator::validate(&merged)?;
        Ok(merged)
    }
}
