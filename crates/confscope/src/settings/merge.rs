//! Settings merging with precedence rules
//!
//! Scalars from a higher-precedence file replace lower ones when set;
//! `[paths]` merges key by key.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::discovery::SettingsFiles;
use super::types::Settings;

/// Settings merger
pub struct SettingsMerger;

impl SettingsMerger {
    /// Merge every discovered file
    ///
    /// Precedence order (highest to lowest):
    /// 1. CLI file
    /// 2. `.confscope.local.toml`
    /// 3. `.confscope.toml`
    /// 4. Global file
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed.
    pub fn merge(files: &SettingsFiles) -> Result<Settings> {
        let mut merged = Settings::default();

        // Lowest precedence first
        for path in [&files.global, &files.project, &files.local, &files.cli]
            .into_iter()
            .flatten()
        {
            Self::merge_into(&mut merged, path)?;
        }

        Ok(merged)
    }

    /// Load one file and overlay it on `base`
    fn merge_into(base: &mut Settings, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "merging settings file");
        Self::overlay(base, settings);
        Ok(())
    }

    fn overlay(base: &mut Settings, top: Settings) {
        if top.sysroot.is_some() {
            base.sysroot = top.sysroot;
        }
        if top.hostname.is_some() {
            base.hostname = top.hostname;
        }

        let paths = top.paths;
        for (slot, value) in [
            (&mut base.paths.sshd, paths.sshd),
            (&mut base.paths.sudoers, paths.sudoers),
            (&mut base.paths.modprobe, paths.modprobe),
            (&mut base.paths.pam, paths.pam),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_merge_no_files() {
        let settings = SettingsMerger::merge(&SettingsFiles::default()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_merge_precedence() {
        let tmp = TempDir::new().unwrap();

        let global = tmp.path().join("global.toml");
        fs::write(
            &global,
            "hostname = \"global\"\nsysroot = \"/mnt/a\"\n[paths]\nsshd = \"/opt/ssh/sshd_config\"\npam = \"/opt/pam.d\"\n",
        )
        .unwrap();

        let project = tmp.path().join("project.toml");
        fs::write(&project, "hostname = \"project\"\n[paths]\npam = \"/srv/pam.d\"\n").unwrap();

        let files = SettingsFiles {
            project: Some(project),
            global: Some(global),
            ..SettingsFiles::default()
        };
        let settings = SettingsMerger::merge(&files).unwrap();

        assert_eq!(settings.hostname.as_deref(), Some("project"));
        // Unset in the project file, so the global value survives
        assert_eq!(settings.sysroot, Some(PathBuf::from("/mnt/a")));
        assert_eq!(settings.paths.sshd, Some(PathBuf::from("/opt/ssh/sshd_config")));
        assert_eq!(settings.paths.pam, Some(PathBuf::from("/srv/pam.d")));
    }

    #[test]
    fn test_cli_file_wins() {
        let tmp = TempDir::new().unwrap();

        let local = tmp.path().join("local.toml");
        fs::write(&local, "hostname = \"local\"\n").unwrap();
        let cli = tmp.path().join("cli.toml");
        fs::write(&cli, "hostname = \"cli\"\n").unwrap();

        let files = SettingsFiles {
            cli: Some(cli),
            local: Some(local),
            ..SettingsFiles::default()
        };
        let settings = SettingsMerger::merge(&files).unwrap();

        assert_eq!(settings.hostname.as_deref(), Some("cli"));
    }

    #[test]
    fn test_merge_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let broken = tmp.path().join("broken.toml");
        fs::write(&broken, "hostname = [").unwrap();

        let files = SettingsFiles {
            project: Some(broken),
            ..SettingsFiles::default()
        };
        let err = SettingsMerger::merge(&files).unwrap_err();

        assert!(err.to_string().contains("Failed to parse settings file"));
    }
}
