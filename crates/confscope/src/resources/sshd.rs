//! OpenSSH daemon configuration
//!
//! `Include` lines are spliced in place, so keys from an included file land
//! in whatever scope was active at the `Include`. A `Match` block runs until
//! the next `Match` or the end of the file that opened it; the including file
//! resumes in the scope it had at the `Include`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::ParseCache;
use crate::directive::{DirectiveGrammar, DirectiveKind, GrammarPolicy, IncludeRef};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::pipeline::{ParsedConfig, Pipeline};
use crate::resolve::{EffectiveConfig, KeyPolicy, OverrideResolver, ScopedBlock, ScopedGrammar, split_list};
use crate::source::PathResolver;

use super::{Resource, split_keyword};

/// Keywords in their documented spelling
const KEYWORDS: &[&str] = &[
    "AcceptEnv",
    "AddressFamily",
    "AllowAgentForwarding",
    "AllowGroups",
    "AllowStreamLocalForwarding",
    "AllowTcpForwarding",
    "AllowUsers",
    "AuthenticationMethods",
    "AuthorizedKeysCommand",
    "AuthorizedKeysCommandUser",
    "AuthorizedKeysFile",
    "AuthorizedPrincipalsCommand",
    "AuthorizedPrincipalsCommandUser",
    "AuthorizedPrincipalsFile",
    "Banner",
    "CASignatureAlgorithms",
    "ChallengeResponseAuthentication",
    "ChannelTimeout",
    "ChrootDirectory",
    "Ciphers",
    "ClientAliveCountMax",
    "ClientAliveInterval",
    "Compression",
    "DenyGroups",
    "DenyUsers",
    "DisableForwarding",
    "ExposeAuthInfo",
    "FingerprintHash",
    "ForceCommand",
    "GatewayPorts",
    "GSSAPIAuthentication",
    "GSSAPICleanupCredentials",
    "GSSAPIStrictAcceptorCheck",
    "HostbasedAcceptedAlgorithms",
    "HostbasedAuthentication",
    "HostbasedUsesNameFromPacketOnly",
    "HostCertificate",
    "HostKey",
    "HostKeyAgent",
    "HostKeyAlgorithms",
    "IgnoreRhosts",
    "IgnoreUserKnownHosts",
    "Include",
    "IPQoS",
    "KbdInteractiveAuthentication",
    "KerberosAuthentication",
    "KerberosGetAFSToken",
    "KerberosOrLocalPasswd",
    "KerberosTicketCleanup",
    "KexAlgorithms",
    "ListenAddress",
    "LoginGraceTime",
    "LogLevel",
    "LogVerbose",
    "MACs",
    "Match",
    "MaxAuthTries",
    "MaxSessions",
    "MaxStartups",
    "ModuliFile",
    "PasswordAuthentication",
    "PermitEmptyPasswords",
    "PermitListen",
    "PermitOpen",
    "PermitRootLogin",
    "PermitTTY",
    "PermitTunnel",
    "PermitUserEnvironment",
    "PermitUserRC",
    "PerSourceMaxStartups",
    "PerSourceNetBlockSize",
    "PidFile",
    "Port",
    "PrintLastLog",
    "PrintMotd",
    "Protocol",
    "PubkeyAcceptedAlgorithms",
    "PubkeyAuthentication",
    "PubkeyAuthOptions",
    "RDomain",
    "RekeyLimit",
    "RequiredRSASize",
    "RevokedKeys",
    "SecurityKeyProvider",
    "SetEnv",
    "StreamLocalBindMask",
    "StreamLocalBindUnlink",
    "StrictModes",
    "Subsystem",
    "SyslogFacility",
    "TCPKeepAlive",
    "TrustedUserCAKeys",
    "UnusedConnectionTimeout",
    "UseDNS",
    "UsePAM",
    "UsePrivilegeSeparation",
    "VersionAddendum",
    "X11DisplayOffset",
    "X11Forwarding",
    "X11UseLocalhost",
    "XAuthLocation",
];

/// Keys whose repeated definitions accumulate; everything else is first-wins
const KEY_POLICIES: &[(&str, KeyPolicy)] = &[
    ("HostKey", KeyPolicy::Append { separator: "," }),
    ("HostCertificate", KeyPolicy::Append { separator: "," }),
    ("ListenAddress", KeyPolicy::Append { separator: "," }),
    ("Subsystem", KeyPolicy::Append { separator: "," }),
    ("AcceptEnv", KeyPolicy::Append { separator: " " }),
    ("AllowUsers", KeyPolicy::Append { separator: " " }),
    ("DenyUsers", KeyPolicy::Append { separator: " " }),
    ("AllowGroups", KeyPolicy::Append { separator: " " }),
    ("DenyGroups", KeyPolicy::Append { separator: " " }),
];

/// Keys reported first-wins although the daemon honours every occurrence
///
/// sshd listens on each `Port` line, but `params` keeps a single value per
/// key; callers needing all ports should read the directive stream.
pub const AMBIGUOUS_KEYS: &[&str] = &["Port"];

/// `sshd_config` syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshdGrammar {
    base_dir: PathBuf,
}

impl SshdGrammar {
    /// Grammar resolving relative includes against `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Documented spelling of a keyword; unknown keywords are lowercased
    #[must_use]
    pub fn canonical_key(key: &str) -> Cow<'_, str> {
        KEYWORDS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(key))
            .map_or_else(|| Cow::Owned(key.to_ascii_lowercase()), |known| Cow::Borrowed(*known))
    }
}

impl Default for SshdGrammar {
    fn default() -> Self {
        Self::new(SshdConfig::BASE_DIR)
    }
}

impl DirectiveGrammar for SshdGrammar {
    fn name(&self) -> &'static str {
        "sshd"
    }

    fn policy(&self) -> GrammarPolicy {
        GrammarPolicy::Strict
    }

    fn include(&self, line: &str) -> Option<IncludeRef> {
        let (keyword, value) = split_keyword(self.strip_comment(line).trim());
        if !keyword.eq_ignore_ascii_case("include") || value.is_empty() {
            return None;
        }
        Some(IncludeRef::Files(
            value.split_whitespace().map(unquote).map(ToString::to_string).collect(),
        ))
    }

    fn include_base(&self, _including: &Path) -> PathBuf {
        self.base_dir.clone()
    }

    fn classify(&self, line: &str) -> std::result::Result<(DirectiveKind, Vec<String>), String> {
        let (keyword, value) = split_keyword(line);
        if keyword.is_empty() {
            return Err(format!("missing keyword in '{line}'"));
        }

        if keyword.eq_ignore_ascii_case("match") {
            if value.is_empty() {
                return Err("Match requires criteria".to_string());
            }
            return Ok((
                DirectiveKind::BlockHeader,
                vec!["Match".to_string(), value.to_string()],
            ));
        }

        if value.is_empty() {
            return Err(format!("missing value for '{keyword}'"));
        }

        Ok((
            DirectiveKind::KeyValue,
            vec![
                Self::canonical_key(keyword).into_owned(),
                unquote(value).to_string(),
            ],
        ))
    }
}

impl ScopedGrammar for SshdGrammar {
    fn key_policy(&self, key: &str) -> KeyPolicy {
        KEY_POLICIES
            .iter()
            .find(|(name, _)| *name == key)
            .map_or(KeyPolicy::FirstWins, |(_, policy)| *policy)
    }

    fn criteria_key(&self) -> &'static str {
        "Match"
    }
}

/// Remove one pair of surrounding double quotes
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[derive(Debug)]
struct SshdState {
    parsed: ParsedConfig,
    effective: EffectiveConfig,
}

/// Effective `sshd_config`
pub struct SshdConfig {
    id: String,
    pipeline: Pipeline<SshdGrammar>,
    cache: ParseCache<SshdState>,
}

impl SshdConfig {
    /// Default primary file
    pub const DEFAULT_PATH: &'static str = "/etc/ssh/sshd_config";
    /// Directory relative paths resolve against
    pub const BASE_DIR: &'static str = "/etc/ssh";

    /// Resource for `path`, or [`Self::DEFAULT_PATH`] when `None`
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, path: Option<&Path>) -> Self {
        let spec = PathResolver::new(Self::BASE_DIR).resolve(Path::new(Self::DEFAULT_PATH), path);
        let id = format!("sshd.config({})", spec.path.display());
        Self {
            id,
            pipeline: Pipeline::new(fs, spec, SshdGrammar::default()),
            cache: ParseCache::new(),
        }
    }

    fn state(&self) -> Result<&SshdState> {
        self.cache.get_or_parse(|| {
            let parsed = self.pipeline.run()?;
            let effective =
                OverrideResolver::new(&self.id, self.pipeline.grammar()).flatten(&parsed.directives);
            Ok(SshdState { parsed, effective })
        })
    }

    /// Global parameters, first definition wins, plus the `Match` key
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn params(&self) -> Result<&BTreeMap<String, String>> {
        Ok(&self.state()?.effective.global_params)
    }

    /// `Match` blocks in file order
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn blocks(&self) -> Result<&[ScopedBlock]> {
        Ok(&self.state()?.effective.blocks)
    }

    /// Global and per-block view together
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn effective(&self) -> Result<&EffectiveConfig> {
        Ok(&self.state()?.effective)
    }

    /// Case-insensitive global parameter lookup
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn param(&self, key: &str) -> Result<Option<&str>> {
        let params = self.params()?;
        Ok(params
            .get(&*SshdGrammar::canonical_key(key))
            .map(String::as_str))
    }

    /// `Ciphers`, split on commas
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn ciphers(&self) -> Result<Vec<String>> {
        self.list("Ciphers")
    }

    /// `MACs`, split on commas
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn macs(&self) -> Result<Vec<String>> {
        self.list("MACs")
    }

    /// `KexAlgorithms`, split on commas
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn kexs(&self) -> Result<Vec<String>> {
        self.list("KexAlgorithms")
    }

    /// Every `HostKey` path
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn host_keys(&self) -> Result<Vec<String>> {
        self.list("HostKey")
    }

    /// `HostKeyAlgorithms`, split on commas
    ///
    /// # Errors
    ///
    /// Returns the (cached) parse error.
    pub fn host_key_algorithms(&self) -> Result<Vec<String>> {
        self.list("HostKeyAlgorithms")
    }

    fn list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.param(key)?.map(split_list).unwrap_or_default())
    }
}

impl Resource for SshdConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn parsed(&self) -> Result<&ParsedConfig> {
        Ok(&self.state()?.parsed)
    }
}
