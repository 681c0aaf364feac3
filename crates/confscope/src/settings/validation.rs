//! Settings validation

use anyhow::Result;

use super::types::Settings;

/// Settings validator
pub struct SettingsValidator;

impl SettingsValidator {
    /// Validate merged settings
    ///
    /// # Errors
    ///
    /// Returns an error if a path is relative or the host name is blank.
    pub fn validate(settings: &Settings) -> Result<()> {
        if let Some(sysroot) = &settings.sysroot {
            if !sysroot.is_absolute() {
                anyhow::bail!("sysroot must be absolute: {}", sysroot.display());
            }
        }

        if let Some(hostname) = &settings.hostname {
            if hostname.trim().is_empty() {
                anyhow::bail!("hostname cannot be empty");
            }
        }

        for (key, path) in settings.paths.iter() {
            if !path.is_absolute() {
                anyhow::bail!("paths.{key} must be absolute: {}", path.display());
            }
        }

        Ok(())
    }
}
