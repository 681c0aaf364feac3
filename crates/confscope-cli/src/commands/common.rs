use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use confscope::{FileSystem, LocalFs, Resource, Settings, SettingsManager};
use serde::Serialize;

use crate::cli::Cli;

/// What every command needs: settings, the filesystem, the output mode
pub struct Context {
    pub settings: Settings,
    pub fs: Arc<dyn FileSystem>,
    pub json: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let settings = if cli.no_config {
            Settings::default()
        } else {
            SettingsManager::load(cli.config.as_deref())?
        };

        let fs = match cli.sysroot.as_ref().or(settings.sysroot.as_ref()) {
            Some(root) => LocalFs::with_sysroot(root)
                .with_context(|| format!("Failed to open sysroot: {}", root.display()))?,
            None => LocalFs::new(),
        };
        tracing::debug!(sysroot = ?fs.sysroot(), "filesystem ready");

        Ok(Self {
            settings,
            fs: Arc::new(fs),
            json: cli.json,
        })
    }

    /// Explicit path from the command line, else the configured one
    pub fn path<'a>(
        explicit: Option<&'a Path>,
        configured: Option<&'a PathBuf>,
    ) -> Option<&'a Path> {
        explicit.or(configured.map(PathBuf::as_path))
    }

    /// Print `value` as JSON, or as the text `render` produces
    pub fn emit<T, F>(&self, value: &T, render: F) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&T) -> String,
    {
        let out = if self.json {
            serde_json::to_string_pretty(value).context("Failed to encode JSON")?
        } else {
            render(value)
        };

        if out.is_empty() {
            return Ok(());
        }
        if out.ends_with('\n') {
            print!("{out}");
        } else {
            println!("{out}");
        }
        Ok(())
    }

    /// Print a list, one item per line in text mode
    pub fn emit_list<T>(&self, items: &[T]) -> anyhow::Result<()>
    where
        T: Serialize + Display,
    {
        self.emit(items, |items| lines(items.iter().map(ToString::to_string)))
    }

    /// Fields shared by every resource
    pub fn emit_common(&self, resource: &dyn Resource, field: CommonField) -> anyhow::Result<()> {
        match field {
            CommonField::Files => {
                let files: Vec<String> = resource
                    .files()?
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                self.emit_list(&files)
            }
            CommonField::Content => {
                let content = resource.content()?;
                self.emit(content.as_str(), ToString::to_string)
            }
            CommonField::Fingerprint => {
                let fingerprint = resource.fingerprint()?;
                self.emit(fingerprint, ToString::to_string)
            }
        }
    }
}

/// Fields every resource answers the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonField {
    Files,
    Content,
    Fingerprint,
}

/// Join rendered items with newlines
pub fn lines<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    items.into_iter().collect::<Vec<_>>().join("\n")
}
