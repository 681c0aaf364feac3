//! Settings types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-subsystem default roots, overriding the built-in locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SubsystemPaths {
    /// `sshd_config` path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sshd: Option<PathBuf>,

    /// Primary sudoers file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudoers: Option<PathBuf>,

    /// `modprobe.d` directory or a single file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modprobe: Option<PathBuf>,

    /// `pam.d` directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pam: Option<PathBuf>,
}

impl SubsystemPaths {
    /// Every configured entry with its key
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PathBuf)> {
        [
            ("sshd", self.sshd.as_ref()),
            ("sudoers", self.sudoers.as_ref()),
            ("modprobe", self.modprobe.as_ref()),
            ("pam", self.pam.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, path)| path.map(|path| (key, path)))
    }
}

/// Merged tool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory every absolute configuration path is re-rooted under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysroot: Option<PathBuf>,

    /// Host name substituted for `%h` in sudoers include paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Subsystem root overrides
    #[serde(default)]
    pub paths: SubsystemPaths,
}
