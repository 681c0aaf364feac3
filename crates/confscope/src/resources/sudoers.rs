//! sudoers policy files
//!
//! Entries are never merged: sudo evaluates user specifications in order
//! with the last match winning, so every entry is kept with its location.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::ParseCache;
use crate::directive::{DirectiveGrammar, DirectiveKind, GrammarPolicy, IncludeRef};
use crate::error::Result;
use crate::fragments::FragmentFilter;
use crate::fs::FileSystem;
use crate::pipeline::{ParsedConfig, Pipeline};
use crate::resolve::{DirectiveCollections, split_list};
use crate::source::PathResolver;

use super::{Location, Resource};

const ALIAS_KINDS: &[&str] = &["User_Alias", "Runas_Alias", "Host_Alias", "Cmnd_Alias"];

const TAGS: &[&str] = &[
    "EXEC",
    "FOLLOW",
    "INTERCEPT",
    "LOG_INPUT",
    "LOG_OUTPUT",
    "MAIL",
    "NOEXEC",
    "NOFOLLOW",
    "NOINTERCEPT",
    "NOLOG_INPUT",
    "NOLOG_OUTPUT",
    "NOMAIL",
    "NOPASSWD",
    "NOSETENV",
    "PASSWD",
    "SETENV",
];

/// A `Defaults` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SudoersDefault {
    /// Where it is written
    pub location: Location,
    /// Scope suffix such as `:alice`, `@host`, `>root` or `!/bin/ls`
    pub qualifier: Option<String>,
    /// Comma-separated settings, e.g. `env_reset`, `!requiretty`
    pub parameters: Vec<String>,
}

/// A `*_Alias` definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SudoersAlias {
    /// Where it is written
    pub location: Location,
    /// `User_Alias`, `Runas_Alias`, `Host_Alias` or `Cmnd_Alias`
    pub kind: String,
    /// Alias name
    pub name: String,
    /// Members in written order
    pub members: Vec<String>,
}

/// A user specification: who may run what, where, as whom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SudoersUserSpec {
    /// Where it is written
    pub location: Location,
    /// Users, groups (`%wheel`) or aliases
    pub users: Vec<String>,
    /// Hosts or host aliases
    pub hosts: Vec<String>,
    /// Runas list without parentheses, e.g. `ALL : ALL`
    pub runas: Option<String>,
    /// Tags such as `NOPASSWD`
    pub tags: Vec<String>,
    /// Commands or command aliases
    pub commands: Vec<String>,
}

/// sudoers syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SudoersGrammar {
    hostname: String,
}

impl SudoersGrammar {
    /// Grammar expanding `%h` in include paths to `hostname`
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

impl DirectiveGrammar for SudoersGrammar {
    fn name(&self) -> &'static str {
        "sudoers"
    }

    fn policy(&self) -> GrammarPolicy {
        GrammarPolicy::Lenient
    }

    fn line_continuation(&self) -> bool {
        true
    }

    fn strip_comment<'a>(&self, line: &'a str) -> &'a str {
        let mut quoted = false;
        for (idx, c) in line.char_indices() {
            match c {
                '"' => quoted = !quoted,
                // `#1000` is a uid, not a comment
                '#' if !quoted && !line[idx + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                    return &line[..idx];
                }
                _ => {}
            }
        }
        line
    }

    fn include(&self, line: &str) -> Option<IncludeRef> {
        const FORMS: &[(&str, bool)] = &[
            ("@includedir", true),
            ("#includedir", true),
            ("@include", false),
            ("#include", false),
        ];

        for (prefix, is_dir) in FORMS {
            let Some(rest) = line.strip_prefix(prefix) else {
                continue;
            };
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let target = unquote(self.strip_comment(rest).trim()).to_string();
            if target.is_empty() {
                return None;
            }
            return Some(if *is_dir {
                IncludeRef::Directory(target)
            } else {
                IncludeRef::Files(vec![target])
            });
        }
        None
    }

    fn expand_include(&self, target: &str) -> String {
        target.replace("%h", &self.hostname).replace("%%", "%")
    }

    fn accepts_fragment(&self, name: &str) -> bool {
        !name.contains('.') && !name.ends_with('~')
    }

    fn fragment_filter(&self) -> Result<FragmentFilter> {
        FragmentFilter::with_patterns(&["README"], &[])
    }

    fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String> {
        let (first, _) = first_word(line);

        if first.starts_with("Defaults") {
            let (qualifier, parameters) = parse_defaults(line)?;
            let tokens = ["defaults".to_string(), qualifier.unwrap_or_default()]
                .into_iter()
                .chain(parameters)
                .collect();
            return Ok((DirectiveKind::KeyValue, tokens));
        }

        if let Some(kind) = alias_kind(first) {
            let (name, members) = parse_alias(line)?;
            let tokens = [kind.to_ascii_lowercase(), name]
                .into_iter()
                .chain(members)
                .collect();
            return Ok((DirectiveKind::ListEntry, tokens));
        }

        let spec = parse_user_spec(line)?;
        let mut tokens = vec!["userspec".to_string()];
        tokens.extend(spec.users);
        tokens.extend(spec.commands);
        Ok((DirectiveKind::ListEntry, tokens))
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn first_word(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

fn alias_kind(word: &str) -> Option<&'static str> {
    if word == "Cmd_Alias" {
        return Some("Cmnd_Alias");
    }
    ALIAS_KINDS.iter().find(|kind| **kind == word).copied()
}

type Defaults = (Option<String>, Vec<String>);

fn parse_defaults(line: &str) -> std::result::Result<Defaults, String> {
    let (first, rest) = first_word(line);
    let suffix = &first["Defaults".len()..];
    let qualifier = match suffix.chars().next() {
        None => None,
        Some(':' | '@' | '>' | '!') => Some(suffix.to_string()),
        Some(_) => return Err(format!("unknown Defaults form '{first}'")),
    };

    let parameters = split_list(rest);
    if parameters.is_empty() {
        return Err("Defaults without parameters".to_string());
    }
    Ok((qualifier, parameters))
}

fn parse_alias(line: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (kind, rest) = first_word(line);
    let Some((name, members)) = rest.split_once('=') else {
        return Err(format!("{kind} without '='"));
    };

    let name = name.trim();
    let valid_name = name.starts_with(|c: char| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid_name {
        return Err(format!("invalid alias name '{name}'"));
    }

    let members = split_list(members);
    if members.is_empty() {
        return Err(format!("alias '{name}' has no members"));
    }
    Ok((name.to_string(), members))
}

struct UserSpecParts {
    users: Vec<String>,
    hosts: Vec<String>,
    runas: Option<String>,
    tags: Vec<String>,
    commands: Vec<String>,
}

fn parse_user_spec(line: &str) -> std::result::Result<UserSpecParts, String> {
    let Some((who, what)) = line.split_once('=') else {
        return Err(format!("unrecognized line '{line}'"));
    };

    let Some((users, hosts)) = split_user_hosts(who.trim()) else {
        return Err(format!("missing host list in '{line}'"));
    };
    let users = split_list(users);
    if users.is_empty() {
        return Err(format!("missing user list in '{line}'"));
    }

    let mut rest = what.trim();
    let mut runas = None;
    if let Some(open) = rest.strip_prefix('(') {
        let Some((inner, after)) = open.split_once(')') else {
            return Err(format!("unterminated runas list in '{line}'"));
        };
        runas = Some(inner.trim().to_string());
        rest = after.trim_start();
    }

    let mut tags = Vec::new();
    while let Some((word, after)) = rest.split_once(':') {
        let word = word.trim();
        if !TAGS.contains(&word) {
            break;
        }
        tags.push(word.to_string());
        rest = after.trim_start();
    }

    let commands = split_list(rest);
    if commands.is_empty() {
        return Err(format!("missing command list in '{line}'"));
    }

    Ok(UserSpecParts {
        users,
        hosts: split_list(hosts),
        runas,
        tags,
        commands,
    })
}

/// Split `users hosts` at the first blank that does not continue a list
fn split_user_hosts(who: &str) -> Option<(&str, &str)> {
    let mut after_comma = false;
    for (idx, c) in who.char_indices() {
        if !c.is_whitespace() {
            after_comma = c == ',';
            continue;
        }
        if after_comma {
            continue;
        }
        let rest = who[idx..].trim_start();
        if !rest.starts_with(',') {
            return Some((&who[..idx], rest));
        }
    }
    None
}

#[derive(Debug)]
struct SudoersState {
    parsed: ParsedConfig,
    defaults: Vec<SudoersDefault>,
    aliases: Vec<SudoersAlias>,
    user_specs: Vec<SudoersUserSpec>,
}

impl SudoersState {
    fn build(parsed: ParsedConfig) -> Self {
        let collections = DirectiveCollections::from_directives(&parsed.directives);

        let defaults = collections
            .get("defaults")
            .iter()
            .filter_map(|d| {
                let (qualifier, parameters) = parse_defaults(&d.raw).ok()?;
                Some(SudoersDefault {
                    location: Location::from(d),
                    qualifier,
                    parameters,
                })
            })
            .collect();

        // Aliases in stream order regardless of kind
        let mut aliases: Vec<SudoersAlias> = ALIAS_KINDS
            .iter()
            .flat_map(|kind| {
                collections
                    .get(&kind.to_ascii_lowercase())
                    .iter()
                    .filter_map(move |d| {
                        let (name, members) = parse_alias(&d.raw).ok()?;
                        Some(SudoersAlias {
                            location: Location::from(d),
                            kind: (*kind).to_string(),
                            name,
                            members,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        aliases.sort_by_key(|alias| stream_position(&parsed, &alias.location));

        let user_specs = collections
            .get("userspec")
            .iter()
            .filter_map(|d| {
                let parts = parse_user_spec(&d.raw).ok()?;
                Some(SudoersUserSpec {
                    location: Location::from(d),
                    users: parts.users,
                    hosts: parts.hosts,
                    runas: parts.runas,
                    tags: parts.tags,
                    commands: parts.commands,
                })
            })
            .collect();

        Self {
            parsed,
            defaults,
            aliases,
            user_specs,
        }
    }
}

fn stream_position(parsed: &ParsedConfig, location: &Location) -> usize {
    parsed
        .directives
        .iter()
        .position(|d| d.source_file == location.file && d.line_number == location.line)
        .unwrap_or(usize::MAX)
}

/// Effective sudoers policy
pub struct Sudoers {
    id: String,
    pipeline: Pipeline<SudoersGrammar>,
    cache: ParseCache<SudoersState>,
}

impl Sudoers {
    /// Default primary file
    pub const DEFAULT_PATH: &'static str = "/etc/sudoers";
    /// Host name used for `%h` when none is given
    pub const DEFAULT_HOSTNAME: &'static str = "localhost";

    /// Resource for `path`, or [`Self::DEFAULT_PATH`] when `None`
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, path: Option<&Path>) -> Self {
        Self::with_hostname(fs, path, Self::DEFAULT_HOSTNAME)
    }

    /// Resource expanding `%h` in include paths to `hostname`
    #[must_use]
    pub fn with_hostname(fs: Arc<dyn FileSystem>, path: Option<&Path>, hostname: &str) -> Self {
        let spec = PathResolver::new("/etc").resolve(Path::new(Self::DEFAULT_PATH), path);
        let id = format!("sudoers({})", spec.path.display());
        Self {
            id,
            pipeline: Pipeline::new(fs, spec, SudoersGrammar::new(hostname)),
            cache: ParseCache::new(),
        }
    }

    fn state(&self) -> Result<&SudoersState> {
        self.cache
            .get_or_parse(|| Ok(SudoersState::build(self.pipeline.run()?)))
    }

    /// `Defaults` entries in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn defaults(&self) -> Result<&[SudoersDefault]> {
        Ok(&self.state()?.defaults)
    }

    /// Alias definitions in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn aliases(&self) -> Result<&[SudoersAlias]> {
        Ok(&self.state()?.aliases)
    }

    /// User specifications in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn user_specs(&self) -> Result<&[SudoersUserSpec]> {
        Ok(&self.state()?.user_specs)
    }

    /// Root file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.pipeline.spec().path
    }
}

impl Resource for Sudoers {
    fn id(&self) -> &str {
        &self.id
    }

    fn parsed(&self) -> Result<&ParsedConfig> {
        Ok(&self.state()?.parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    fn sudoers(fs: MemoryFs) -> Sudoers {
        Sudoers::new(Arc::new(fs), None)
    }

    #[test]
    fn test_includedir_skips_readme() {
        let fs = MemoryFs::new()
            .with_file("/etc/sudoers", "root ALL=(ALL:ALL) ALL\n@includedir /etc/sudoers.d\n")
            .with_file("/etc/sudoers.d/README", "# do not edit\n")
            .with_file("/etc/sudoers.d/90-custom", "%wheel ALL=(ALL) NOPASSWD: ALL\n")
            .with_file("/etc/sudoers.d/90-custom.bak", "bob ALL=(ALL) ALL\n")
            .with_file("/etc/sudoers.d/ops.conf", "ops ALL=(ALL) ALL\n");
        let config = sudoers(fs);

        assert_eq!(
            config.files().unwrap(),
            [Path::new("/etc/sudoers"), Path::new("/etc/sudoers.d/90-custom")]
        );
    }

    #[test]
    fn test_legacy_hash_include() {
        let fs = MemoryFs::new()
            .with_file("/etc/sudoers", "#includedir /etc/sudoers.d\n#include extra\n")
            .with_file("/etc/sudoers.d/10-ops", "")
            .with_file("/etc/extra", "");
        let config = sudoers(fs);

        assert_eq!(
            config.files().unwrap(),
            [
                Path::new("/etc/sudoers"),
                Path::new("/etc/sudoers.d/10-ops"),
                Path::new("/etc/extra"),
            ]
        );
    }

    #[test]
    fn test_hostname_expansion() {
        let fs = MemoryFs::new()
            .with_file("/etc/sudoers", "@include /etc/sudoers.%h\n")
            .with_file("/etc/sudoers.web01", "Defaults env_reset\n");
        let config = Sudoers::with_hostname(Arc::new(fs), None, "web01");

        assert_eq!(config.files().unwrap().len(), 2);
        assert_eq!(config.defaults().unwrap()[0].parameters, ["env_reset"]);
    }

    #[test]
    fn test_defaults() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "Defaults env_reset, mail_badpass\nDefaults:alice !requiretty\nDefaults use_pty\n",
        );
        let config = sudoers(fs);
        let defaults = config.defaults().unwrap();

        assert_eq!(defaults.len(), 3);
        assert_eq!(defaults[0].qualifier, None);
        assert_eq!(defaults[0].parameters, ["env_reset", "mail_badpass"]);
        assert_eq!(defaults[1].qualifier.as_deref(), Some(":alice"));
        assert_eq!(defaults[1].parameters, ["!requiretty"]);
        assert_eq!(defaults[2].location.line, 3);
    }

    #[test]
    fn test_aliases_keep_stream_order() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "Cmnd_Alias SHUTDOWN = /sbin/halt, /sbin/reboot\nUser_Alias ADMINS = alice, bob\n",
        );
        let config = sudoers(fs);
        let aliases = config.aliases().unwrap();

        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].kind, "Cmnd_Alias");
        assert_eq!(aliases[0].name, "SHUTDOWN");
        assert_eq!(aliases[0].members, ["/sbin/halt", "/sbin/reboot"]);
        assert_eq!(aliases[1].kind, "User_Alias");
        assert_eq!(aliases[1].members, ["alice", "bob"]);
    }

    #[test]
    fn test_user_specs() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "root ALL=(ALL:ALL) ALL\n%admin, alice web01 = (root) NOPASSWD: SETENV: /bin/ls, /bin/cat\n#1000 ALL = ALL\n",
        );
        let config = sudoers(fs);
        let specs = config.user_specs().unwrap();

        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].users, ["root"]);
        assert_eq!(specs[0].runas.as_deref(), Some("ALL:ALL"));
        assert_eq!(specs[1].users, ["%admin", "alice"]);
        assert_eq!(specs[1].hosts, ["web01"]);
        assert_eq!(specs[1].tags, ["NOPASSWD", "SETENV"]);
        assert_eq!(specs[1].commands, ["/bin/ls", "/bin/cat"]);
        assert_eq!(specs[2].users, ["#1000"]);
    }

    #[test]
    fn test_trailing_comments_are_dropped() {
        let fs = MemoryFs::new()
            .with_file(
                "/etc/sudoers",
                "Defaults env_reset # reset env\nroot ALL=(ALL) ALL # admin\n#1000 ALL = /bin/ls #list\n@include extra # site\n",
            )
            .with_file("/etc/extra", "Defaults passprompt=\"pw#%p: \"\n");
        let config = sudoers(fs);

        assert_eq!(
            config.files().unwrap(),
            [Path::new("/etc/sudoers"), Path::new("/etc/extra")]
        );

        let defaults = config.defaults().unwrap();
        assert_eq!(defaults[0].parameters, ["env_reset"]);
        assert_eq!(defaults[1].parameters, ["passprompt=\"pw#%p: \""]);

        let specs = config.user_specs().unwrap();
        assert_eq!(specs[0].commands, ["ALL"]);
        assert_eq!(specs[1].users, ["#1000"]);
        assert_eq!(specs[1].commands, ["/bin/ls"]);
        assert!(config.diagnostics().unwrap().is_empty());
    }

    #[test]
    fn test_host_list_with_spaces() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "alice host1, host2 = ALL\nbob , carol web01 ,web02=(root) /bin/ls\n",
        );
        let config = sudoers(fs);
        let specs = config.user_specs().unwrap();

        assert_eq!(specs[0].users, ["alice"]);
        assert_eq!(specs[0].hosts, ["host1", "host2"]);
        assert_eq!(specs[1].users, ["bob", "carol"]);
        assert_eq!(specs[1].hosts, ["web01", "web02"]);
        assert_eq!(specs[1].runas.as_deref(), Some("root"));
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "Defaults env_reset\nDefaults env_reset\n",
        );
        let config = sudoers(fs);

        assert_eq!(config.defaults().unwrap().len(), 2);
    }

    #[test]
    fn test_continuation_lines() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "Cmnd_Alias NET = /sbin/ip, \\\n    /sbin/ifconfig\n",
        );
        let config = sudoers(fs);
        let aliases = config.aliases().unwrap();

        assert_eq!(aliases[0].members, ["/sbin/ip", "/sbin/ifconfig"]);
        assert_eq!(aliases[0].location.line, 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let fs = MemoryFs::new().with_file(
            "/etc/sudoers",
            "this is not sudoers\nUser_Alias lower = x\nroot ALL=(ALL) ALL\n",
        );
        let config = sudoers(fs);

        assert_eq!(config.user_specs().unwrap().len(), 1);
        let diagnostics = config.diagnostics().unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].line, 1);
        assert!(diagnostics[1].message.contains("invalid alias name"));
    }

    #[test]
    fn test_missing_sudoers() {
        let config = sudoers(MemoryFs::new());

        assert!(config.user_specs().unwrap_err().is_not_found());
        assert_eq!(config.path(), Path::new("/etc/sudoers"));
    }
}
