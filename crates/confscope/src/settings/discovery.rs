//! Settings file discovery from multiple locations

use std::path::{Path, PathBuf};

/// Project-local settings, usually kept out of version control
pub const LOCAL_FILE: &str = ".confscope.local.toml";
/// Project settings
pub const PROJECT_FILE: &str = ".confscope.toml";

/// Settings file locations in order of precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFiles {
    /// File from the CLI flag (highest precedence)
    pub cli: Option<PathBuf>,
    /// Project-local file (`.confscope.local.toml`)
    pub local: Option<PathBuf>,
    /// Project file (`.confscope.toml`)
    pub project: Option<PathBuf>,
    /// Global XDG file
    pub global: Option<PathBuf>,
}

/// Settings file discovery
pub struct SettingsDiscovery;

impl SettingsDiscovery {
    /// Discover settings files from the current directory and the user's
    /// config directory
    #[must_use]
    pub fn discover(cli_path: Option<&Path>) -> SettingsFiles {
        let cwd = std::env::current_dir().ok();
        let global_dir = dirs::config_dir();
        Self::discover_from(cli_path, cwd.as_deref(), global_dir.as_deref())
    }

    /// Discover settings files starting at `start` and looking for the
    /// global file under `config_dir`
    #[must_use]
    pub fn discover_from(
        cli_path: Option<&Path>,
        start: Option<&Path>,
        config_dir: Option<&Path>,
    ) -> SettingsFiles {
        let cli = cli_path.filter(|p| p.is_file()).map(Path::to_path_buf);
        let local = start.and_then(|dir| Self::find_file(dir, LOCAL_FILE));
        let project = start.and_then(|dir| Self::find_file(dir, PROJECT_FILE));
        let global = config_dir
            .map(|dir| dir.join("confscope").join("config.toml"))
            .filter(|path| path.is_file());

        SettingsFiles {
            cli,
            local,
            project,
            global,
        }
    }

    /// Find a file in `start` or any of its parents
    fn find_file(start: &Path, name: &str) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_nothing() {
        let tmp = TempDir::new().unwrap();
        let files = SettingsDiscovery::discover_from(None, Some(tmp.path()), Some(tmp.path()));

        assert!(files.cli.is_none());
        assert!(files.global.is_none());
    }

    #[test]
    fn test_discover_cli_file() {
        let tmp = TempDir::new().unwrap();
        let cli = tmp.path().join("custom.toml");
        fs::write(&cli, "# settings").unwrap();

        let files = SettingsDiscovery::discover_from(Some(&cli), None, None);

        assert_eq!(files.cli, Some(cli));
    }

    #[test]
    fn test_discover_in_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join(PROJECT_FILE), "").unwrap();
        fs::write(nested.join(LOCAL_FILE), "").unwrap();

        let files = SettingsDiscovery::discover_from(None, Some(&nested), None);

        assert_eq!(files.local, Some(nested.join(LOCAL_FILE)));
        assert_eq!(files.project, Some(tmp.path().join(PROJECT_FILE)));
    }

    #[test]
    fn test_discover_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("confscope").join("config.toml");
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(&global, "").unwrap();

        let files = SettingsDiscovery::discover_from(None, None, Some(tmp.path()));

        assert_eq!(files.global, Some(global));
    }
}
