//! `modprobe.d` directives
//!
//! modprobe reads every `*.conf` in the directory in name order and has no
//! include syntax. Later `options` lines add to earlier ones; the first
//! `install`/`remove` for a module wins, which is why entries stay ordered.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::ParseCache;
use crate::directive::{Directive, DirectiveGrammar, DirectiveKind, GrammarPolicy, IncludeRef};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::pipeline::{ParsedConfig, Pipeline};
use crate::resolve::DirectiveCollections;
use crate::source::PathResolver;

use super::{Location, Resource};

/// Commands that make an `install` line disable a module
const DISABLING_COMMANDS: &[&str] = &["/bin/true", "/bin/false", "/usr/bin/true", "/usr/bin/false"];

/// `alias <wildcard> <module>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModprobeAlias {
    /// Where it is written
    pub location: Location,
    /// Alias pattern
    pub wildcard: String,
    /// Target module
    pub module: String,
}

/// `options <module> <params...>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModprobeOption {
    /// Where it is written
    pub location: Location,
    /// Module name
    pub module: String,
    /// `name=value` parameters
    pub parameters: Vec<String>,
}

/// `install <module> <command>` or `remove <module> <command>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModprobeCommand {
    /// Where it is written
    pub location: Location,
    /// Module name
    pub module: String,
    /// Shell command run instead of the default action
    pub command: String,
}

/// `blacklist <module>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModprobeBlacklist {
    /// Where it is written
    pub location: Location,
    /// Module name
    pub module: String,
}

/// `softdep <module> pre: <modules...> post: <modules...>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModprobeSoftdep {
    /// Where it is written
    pub location: Location,
    /// Module name
    pub module: String,
    /// Loaded before `module`
    pub pre: Vec<String>,
    /// Loaded after `module`
    pub post: Vec<String>,
}

/// modprobe.d syntax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModprobeGrammar;

impl DirectiveGrammar for ModprobeGrammar {
    fn name(&self) -> &'static str {
        "modprobe"
    }

    fn policy(&self) -> GrammarPolicy {
        GrammarPolicy::Lenient
    }

    fn line_continuation(&self) -> bool {
        true
    }

    fn include(&self, _line: &str) -> Option<IncludeRef> {
        None
    }

    fn accepts_fragment(&self, name: &str) -> bool {
        name.ends_with(".conf")
    }

    fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String> {
        let (keyword, rest) = first_word(line);
        let keyword = keyword.to_ascii_lowercase();
        let (module, tail) = first_word(rest);
        if module.is_empty() {
            return Err(format!("'{keyword}' without a module name"));
        }

        let tokens: Vec<String> = match keyword.as_str() {
            "alias" => {
                let (target, extra) = first_word(tail);
                if target.is_empty() || !extra.is_empty() {
                    return Err("alias expects a wildcard and a module".to_string());
                }
                vec![keyword.clone(), module.to_string(), target.to_string()]
            }
            "options" => [keyword.clone(), module.to_string()]
                .into_iter()
                .chain(tail.split_whitespace().map(ToString::to_string))
                .collect(),
            "install" | "remove" => {
                if tail.is_empty() {
                    return Err(format!("'{keyword} {module}' without a command"));
                }
                vec![keyword.clone(), module.to_string(), tail.to_string()]
            }
            "blacklist" => {
                if !tail.is_empty() {
                    return Err("blacklist expects a single module".to_string());
                }
                vec![keyword.clone(), module.to_string()]
            }
            "softdep" => {
                parse_softdep(tail)?;
                [keyword.clone(), module.to_string()]
                    .into_iter()
                    .chain(tail.split_whitespace().map(ToString::to_string))
                    .collect()
            }
            _ => return Err(format!("unknown directive '{keyword}'")),
        };

        Ok((DirectiveKind::KeyValue, tokens))
    }
}

fn first_word(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

fn parse_softdep(spec: &str) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    let mut into_post = None;

    for word in spec.split_whitespace() {
        match (word, into_post) {
            ("pre:", _) => into_post = Some(false),
            ("post:", _) => into_post = Some(true),
            (module, Some(false)) => pre.push(module.to_string()),
            (module, Some(true)) => post.push(module.to_string()),
            (module, None) => {
                return Err(format!("softdep module '{module}' before pre: or post:"));
            }
        }
    }

    if pre.is_empty() && post.is_empty() {
        return Err("softdep without dependencies".to_string());
    }
    Ok((pre, post))
}

/// Module names compare with `-` and `_` interchangeable
fn same_module(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == y || (matches!(x, b'-' | b'_') && matches!(y, b'-' | b'_')))
}

#[derive(Debug)]
struct ModprobeState {
    parsed: ParsedConfig,
    aliases: Vec<ModprobeAlias>,
    options: Vec<ModprobeOption>,
    installs: Vec<ModprobeCommand>,
    removes: Vec<ModprobeCommand>,
    blacklist: Vec<ModprobeBlacklist>,
    softdeps: Vec<ModprobeSoftdep>,
}

impl ModprobeState {
    fn build(parsed: ParsedConfig) -> Self {
        let collections = DirectiveCollections::from_directives(&parsed.directives);

        let module = |d: &Directive| d.tokens.get(1).cloned().unwrap_or_default();
        let commands = |keyword: &str| -> Vec<ModprobeCommand> {
            collections
                .get(keyword)
                .iter()
                .map(|d| ModprobeCommand {
                    location: Location::from(d),
                    module: module(d),
                    command: d.tokens.get(2).cloned().unwrap_or_default(),
                })
                .collect()
        };

        let aliases = collections
            .get("alias")
            .iter()
            .map(|d| ModprobeAlias {
                location: Location::from(d),
                wildcard: module(d),
                module: d.tokens.get(2).cloned().unwrap_or_default(),
            })
            .collect();

        let options = collections
            .get("options")
            .iter()
            .map(|d| ModprobeOption {
                location: Location::from(d),
                module: module(d),
                parameters: d.tokens.iter().skip(2).cloned().collect(),
            })
            .collect();

        let blacklist = collections
            .get("blacklist")
            .iter()
            .map(|d| ModprobeBlacklist {
                location: Location::from(d),
                module: module(d),
            })
            .collect();

        let softdeps = collections
            .get("softdep")
            .iter()
            .filter_map(|d| {
                let spec = d.tokens.get(2..).unwrap_or_default().join(" ");
                let (pre, post) = parse_softdep(&spec).ok()?;
                Some(ModprobeSoftdep {
                    location: Location::from(d),
                    module: module(d),
                    pre,
                    post,
                })
            })
            .collect();

        let installs = commands("install");
        let removes = commands("remove");

        Self {
            parsed,
            aliases,
            options,
            installs,
            removes,
            blacklist,
            softdeps,
        }
    }
}

/// Effective modprobe.d configuration
pub struct Modprobe {
    id: String,
    pipeline: Pipeline<ModprobeGrammar>,
    cache: ParseCache<ModprobeState>,
}

impl Modprobe {
    /// Default configuration directory
    pub const DEFAULT_PATH: &'static str = "/etc/modprobe.d";

    /// Resource for `path` (a directory or a single file), or
    /// [`Self::DEFAULT_PATH`] when `None`
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, path: Option<&Path>) -> Self {
        let spec = PathResolver::new(Self::DEFAULT_PATH).resolve(Path::new(Self::DEFAULT_PATH), path);
        let id = format!("modprobe({})", spec.path.display());
        Self {
            id,
            pipeline: Pipeline::new(fs, spec, ModprobeGrammar),
            cache: ParseCache::new(),
        }
    }

    fn state(&self) -> Result<&ModprobeState> {
        self.cache
            .get_or_parse(|| Ok(ModprobeState::build(self.pipeline.run()?)))
    }

    /// `alias` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn aliases(&self) -> Result<&[ModprobeAlias]> {
        Ok(&self.state()?.aliases)
    }

    /// `options` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn options(&self) -> Result<&[ModprobeOption]> {
        Ok(&self.state()?.options)
    }

    /// `install` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn installs(&self) -> Result<&[ModprobeCommand]> {
        Ok(&self.state()?.installs)
    }

    /// `remove` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn removes(&self) -> Result<&[ModprobeCommand]> {
        Ok(&self.state()?.removes)
    }

    /// `blacklist` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn blacklist(&self) -> Result<&[ModprobeBlacklist]> {
        Ok(&self.state()?.blacklist)
    }

    /// `softdep` lines in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn softdeps(&self) -> Result<&[ModprobeSoftdep]> {
        Ok(&self.state()?.softdeps)
    }

    /// Whether `module` is blacklisted
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn is_blacklisted(&self, module: &str) -> Result<bool> {
        Ok(self
            .blacklist()?
            .iter()
            .any(|entry| same_module(&entry.module, module)))
    }

    /// Whether the effective `install` command for `module` is a no-op
    /// such as `/bin/true`
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn is_install_disabled(&self, module: &str) -> Result<bool> {
        let effective = self
            .installs()?
            .iter()
            .find(|entry| same_module(&entry.module, module));
        Ok(effective.is_some_and(|entry| {
            entry
                .command
                .split_whitespace()
                .next()
                .is_some_and(|program| DISABLING_COMMANDS.contains(&program))
        }))
    }
}

impl Resource for Modprobe {
    fn id(&self) -> &str {
        &self.id
    }

    fn parsed(&self) -> Result<&ParsedConfig> {
        Ok(&self.state()?.parsed)
    }
}
