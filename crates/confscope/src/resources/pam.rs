//! PAM service stacks from `pam.d`

use std::path::{Path, PathBuf};
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

const TYPES: &[&str] = &["account", "auth", "password", "session"];

/// One line of a service stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PamEntry {
    /// Where it is written
    pub location: Location,
    /// Service file the line belongs to, e.g. `sshd` or `common-auth`
    pub service: String,
    /// `auth`, `account`, `password` or `session`
    #[serde(rename = "type")]
    pub pam_type: String,
    /// `required`, `sufficient`, ... or a bracketed `[value=action]` group
    pub control: String,
    /// Module path, e.g. `pam_unix.so`
    pub module: String,
    /// Module arguments; bracketed arguments are kept whole
    pub args: Vec<String>,
    /// Leading `-`: a missing module is not an error
    pub optional: bool,
}

/// pam.d syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PamGrammar {
    base_dir: PathBuf,
}

impl PamGrammar {
    /// Grammar resolving `@include` against `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Default for PamGrammar {
    fn default() -> Self {
        Self::new(PamConf::DEFAULT_PATH)
    }
}

impl DirectiveGrammar for PamGrammar {
    fn name(&self) -> &'static str {
        "pam"
    }

    fn policy(&self) -> GrammarPolicy {
        GrammarPolicy::Lenient
    }

    fn line_continuation(&self) -> bool {
        true
    }

    fn include(&self, line: &str) -> Option<IncludeRef> {
        let rest = line.strip_prefix("@include")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let target = self.strip_comment(rest).trim();
        (!target.is_empty()).then(|| IncludeRef::Files(vec![target.to_string()]))
    }

    fn include_base(&self, _including: &Path) -> PathBuf {
        self.base_dir.clone()
    }

    fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String> {
        let line = line.strip_prefix('-').unwrap_or(line);
        let words = tokenize(line)?;

        let [pam_type, control, module, args @ ..] = words.as_slice() else {
            return Err(format!("expected 'type control module', got '{line}'"));
        };
        let pam_type = pam_type.to_ascii_lowercase();
        if !TYPES.contains(&pam_type.as_str()) {
            return Err(format!("unknown module type '{pam_type}'"));
        }
        if module.starts_with('[') {
            return Err(format!("invalid module path '{module}'"));
        }

        let tokens = [pam_type, control.clone(), module.clone()]
            .into_iter()
            .chain(args.iter().cloned())
            .collect();
        Ok((DirectiveKind::ListEntry, tokens))
    }
}

/// Split on whitespace, keeping `[...]` groups as one word
fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in line.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' if depth > 0 => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if depth > 0 {
        return Err("unterminated '['".to_string());
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

fn entry(directive: &Directive) -> PamEntry {
    let service = directive
        .source_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let token = |idx: usize| directive.tokens.get(idx).cloned().unwrap_or_default();

    PamEntry {
        location: Location::from(directive),
        service,
        pam_type: token(0),
        control: token(1),
        module: token(2),
        args: directive.tokens.iter().skip(3).cloned().collect(),
        optional: directive.raw.starts_with('-'),
    }
}

#[derive(Debug)]
struct PamState {
    parsed: ParsedConfig,
    entries: Vec<PamEntry>,
    collections: DirectiveCollections,
}

/// Effective PAM configuration for one service or the whole directory
pub struct PamConf {
    id: String,
    pipeline: Pipeline<PamGrammar>,
    cache: ParseCache<PamState>,
}

impl PamConf {
    /// Default service directory
    pub const DEFAULT_PATH: &'static str = "/etc/pam.d";

    /// Resource for the `pam.d` directory at `path` (or
    /// [`Self::DEFAULT_PATH`]), narrowed to `service` when given
    ///
    /// Without a service every file in the directory is read once, so each
    /// line appears exactly once under the file that holds it. A shared
    /// `@include common-auth` is then not repeated inside each service that
    /// pulls it in; pass `service` to see one service's full stack.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, path: Option<&Path>, service: Option<&str>) -> Self {
        let dir = PathResolver::new(Self::DEFAULT_PATH)
            .resolve(Path::new(Self::DEFAULT_PATH), path)
            .path;
        let spec = PathResolver::new(&dir).resolve(&dir, service.map(Path::new));
        let id = format!("pam({})", spec.path.display());
        Self {
            id,
            pipeline: Pipeline::new(fs, spec, PamGrammar::new(dir)),
            cache: ParseCache::new(),
        }
    }

    fn state(&self) -> Result<&PamState> {
        self.cache.get_or_parse(|| {
            let parsed = self.pipeline.run()?;
            let collections = DirectiveCollections::from_directives(&parsed.directives);
            let entries = parsed
                .directives
                .iter()
                .filter(|d| d.kind == DirectiveKind::ListEntry)
                .map(entry)
                .collect();
            Ok(PamState {
                parsed,
                entries,
                collections,
            })
        })
    }

    /// Every entry in stream order, includes spliced in place
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn entries(&self) -> Result<&[PamEntry]> {
        Ok(&self.state()?.entries)
    }

    /// Entries of one module type (`auth`, `session`, ...) in stream order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn entries_of(&self, pam_type: &str) -> Result<Vec<PamEntry>> {
        let state = self.state()?;
        Ok(state
            .collections
            .get(&pam_type.to_ascii_lowercase())
            .iter()
            .map(entry)
            .collect())
    }
}

impl Resource for PamConf {
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

    fn pam_fs() -> MemoryFs {
        MemoryFs::new()
            .with_file(
                "/etc/pam.d/sshd",
                "# PAM for sshd\n\
                 @include common-auth\n\
                 account    required     pam_nologin.so\n\
                 -session   optional     pam_systemd.so\n\
                 session [success=ok ignore=ignore default=bad] pam_selinux.so close\n",
            )
            .with_file(
                "/etc/pam.d/common-auth",
                "auth [success=1 default=ignore] pam_unix.so nullok\n\
                 auth requisite pam_deny.so\n",
            )
            .with_file("/etc/pam.d/login", "auth required pam_securetty.so\n")
    }

    #[test]
    fn test_service_with_include() {
        let pam = PamConf::new(Arc::new(pam_fs()), None, Some("sshd"));

        assert_eq!(
            pam.files().unwrap(),
            [Path::new("/etc/pam.d/sshd"), Path::new("/etc/pam.d/common-auth")]
        );

        let entries = pam.entries().unwrap();
        let modules: Vec<&str> = entries.iter().map(|e| e.module.as_str()).collect();
        assert_eq!(
            modules,
            ["pam_unix.so", "pam_deny.so", "pam_nologin.so", "pam_systemd.so", "pam_selinux.so"]
        );

        assert_eq!(entries[0].service, "common-auth");
        assert_eq!(entries[0].control, "[success=1 default=ignore]");
        assert_eq!(entries[0].args, ["nullok"]);
        assert_eq!(entries[3].service, "sshd");
        assert!(entries[3].optional);
        assert!(!entries[2].optional);
        assert_eq!(entries[4].args, ["close"]);
    }

    #[test]
    fn test_entries_of_type() {
        let pam = PamConf::new(Arc::new(pam_fs()), None, Some("sshd"));

        let session = pam.entries_of("session").unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session[0].pam_type, "session");
        assert!(pam.entries_of("password").unwrap().is_empty());
    }

    #[test]
    fn test_whole_directory() {
        let pam = PamConf::new(Arc::new(pam_fs()), None, None);

        assert_eq!(
            pam.files().unwrap(),
            [
                Path::new("/etc/pam.d/common-auth"),
                Path::new("/etc/pam.d/login"),
                Path::new("/etc/pam.d/sshd"),
            ]
        );

        let services: Vec<&str> = pam
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.service.as_str())
            .collect();
        assert_eq!(
            services,
            ["common-auth", "common-auth", "login", "sshd", "sshd", "sshd"]
        );

        // Narrowed to one service, the shared include is spliced in again
        let sshd = PamConf::new(Arc::new(pam_fs()), None, Some("sshd"));
        assert_eq!(sshd.entries_of("auth").unwrap().len(), 2);
    }

    #[test]
    fn test_bracketed_argument() {
        let fs = MemoryFs::new().with_file(
            "/etc/pam.d/su",
            "auth required pam_listfile.so item=user [onerr=fail sense=deny]\n",
        );
        let pam = PamConf::new(Arc::new(fs), None, Some("su"));

        assert_eq!(
            pam.entries().unwrap()[0].args,
            ["item=user", "[onerr=fail sense=deny]"]
        );
    }

    #[test]
    fn test_malformed_lines() {
        let fs = MemoryFs::new().with_file(
            "/etc/pam.d/other",
            "auth required\nfrobnicate required pam_x.so\nauth [broken pam_x.so\nauth required pam_deny.so\n",
        );
        let pam = PamConf::new(Arc::new(fs), None, Some("other"));

        assert_eq!(pam.entries().unwrap().len(), 1);
        assert_eq!(pam.diagnostics().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_service() {
        let pam = PamConf::new(Arc::new(pam_fs()), None, Some("vsftpd"));

        assert!(pam.entries().unwrap_err().is_not_found());
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("a  b\t[c d]").unwrap(), ["a", "b", "[c d]"]);
        assert!(tokenize("a [b").is_err());
    }
}
