//! Effective-configuration computation
//!
//! # Scoped grammars
//!
//! A block header opens a [`ScopedBlock`] that stays active until the next
//! header or the end of the file holding it. When an included file ends, the
//! including file resumes in the scope it had at the include line. Key/value
//! directives go to the active block, or to the global parameters when no
//! block is active.
//!
//! Within a scope the first definition of a key is authoritative. Keys with
//! an [`KeyPolicy::Append`] policy accumulate every value instead.
//!
//! # Non-scoped grammars
//!
//! Nothing is merged. [`DirectiveCollections`] groups directives by keyword
//! and keeps every entry, duplicates included.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::directive::{Directive, DirectiveGrammar, DirectiveKind};

/// How repeated definitions of one key combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Keep the first value in stream order
    FirstWins,
    /// Join every value in stream order
    Append {
        /// Separator placed between values
        separator: &'static str,
    },
}

/// Grammar with conditional blocks and per-key override rules
pub trait ScopedGrammar: DirectiveGrammar {
    /// Override policy for a canonical key
    fn key_policy(&self, key: &str) -> KeyPolicy;

    /// Reserved global key listing every block's criteria
    fn criteria_key(&self) -> &'static str;
}

/// Location of a block: header line to last attributed line in that file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    /// File holding the block header
    pub file: PathBuf,
    /// Header line
    pub start_line: usize,
    /// Last line of `file` attributed to the block
    pub end_line: usize,
}

/// A conditional section and its own effective parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedBlock {
    /// Stable identity derived from the owning resource and the criteria
    pub id: String,
    /// Header argument, e.g. `User svc`
    pub criteria: String,
    /// Effective parameters inside this block
    pub params: BTreeMap<String, String>,
    /// Where the block is written
    pub source_range: SourceRange,
}

/// Flattened view of a scoped configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    /// Parameters outside any block, plus the synthesized criteria key
    pub global_params: BTreeMap<String, String>,
    /// Blocks in stream order, which is precedence order
    pub blocks: Vec<ScopedBlock>,
}

/// Builds an [`EffectiveConfig`] from an include-expanded directive stream
pub struct OverrideResolver<'a, G: ?Sized> {
    resource_id: &'a str,
    grammar: &'a G,
}

impl<'a, G: ScopedGrammar + ?Sized> OverrideResolver<'a, G> {
    /// Resolver for the resource identified by `resource_id`
    #[must_use]
    pub const fn new(resource_id: &'a str, grammar: &'a G) -> Self {
        Self {
            resource_id,
            grammar,
        }
    }

    /// Flatten `directives` into global and per-block parameters
    ///
    /// Key/value directives are expected as `[key, value]` tokens and block
    /// headers as `[keyword, criteria]`.
    #[must_use]
    pub fn flatten(&self, directives: &[Directive]) -> EffectiveConfig {
        let mut global_params = BTreeMap::new();
        let mut blocks: Vec<ScopedBlock> = Vec::new();
        let mut seen_ids: HashMap<String, usize> = HashMap::new();
        let mut active: Option<usize> = None;
        let mut frames: Vec<FileFrame<'_>> = Vec::new();

        for directive in directives {
            // Leaving a file restores the scope its includer had at the include
            while let Some(frame) = frames.last() {
                let left = frame.depth > directive.depth
                    || (frame.depth == directive.depth && frame.file != directive.source_file.as_path());
                if !left {
                    break;
                }
                active = frame.resume;
                frames.pop();
            }
            if frames.last().is_none_or(|frame| frame.depth < directive.depth) {
                frames.push(FileFrame {
                    file: &directive.source_file,
                    depth: directive.depth,
                    resume: active,
                });
            }

            match directive.kind {
                DirectiveKind::BlockHeader => {
                    let criteria = directive.args().join(" ");
                    let id = self.block_id(&criteria, &mut seen_ids);
                    active = Some(blocks.len());
                    blocks.push(ScopedBlock {
                        id,
                        criteria,
                        params: BTreeMap::new(),
                        source_range: SourceRange {
                            file: directive.source_file.clone(),
                            start_line: directive.line_number,
                            end_line: directive.line_number,
                        },
                    });
                }
                DirectiveKind::KeyValue => {
                    let key = directive.keyword();
                    let value = directive.args().join(" ");
                    let params = match active.and_then(|idx| blocks.get_mut(idx)) {
                        Some(block) => {
                            if block.source_range.file == directive.source_file {
                                block.source_range.end_line = directive.line_number;
                            }
                            &mut block.params
                        }
                        None => &mut global_params,
                    };
                    apply(params, key, value, self.grammar.key_policy(key));
                }
                DirectiveKind::ListEntry | DirectiveKind::Include => {}
            }
        }

        if !blocks.is_empty() {
            let criteria: Vec<&str> = blocks.iter().map(|b| b.criteria.as_str()).collect();
            global_params.insert(self.grammar.criteria_key().to_string(), criteria.join(","));
        }

        EffectiveConfig {
            global_params,
            blocks,
        }
    }

    fn block_id(&self, criteria: &str, seen: &mut HashMap<String, usize>) -> String {
        let base = format!("{}/{}", self.resource_id, criteria);
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}

/// One file of the spliced stream and the scope to resume once it ends
struct FileFrame<'d> {
    file: &'d Path,
    depth: usize,
    resume: Option<usize>,
}

fn apply(params: &mut BTreeMap<String, String>, key: &str, value: String, policy: KeyPolicy) {
    match policy {
        KeyPolicy::FirstWins => {
            params.entry(key.to_string()).or_insert(value);
        }
        KeyPolicy::Append { separator } => {
            params
                .entry(key.to_string())
                .and_modify(|existing| {
                    existing.push_str(separator);
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
    }
}

/// Directives of a non-scoped grammar grouped by lowercase keyword
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveCollections {
    groups: BTreeMap<String, Vec<Directive>>,
}

impl DirectiveCollections {
    /// Group every non-include directive, preserving stream order per group
    #[must_use]
    pub fn from_directives(directives: &[Directive]) -> Self {
        let mut groups: BTreeMap<String, Vec<Directive>> = BTreeMap::new();
        for directive in directives {
            if directive.kind == DirectiveKind::Include {
                continue;
            }
            groups
                .entry(directive.keyword().to_ascii_lowercase())
                .or_default()
                .push(directive.clone());
        }
        Self { groups }
    }

    /// Entries for one keyword, in stream order
    #[must_use]
    pub fn get(&self, keyword: &str) -> &[Directive] {
        self.groups.get(keyword).map_or(&[], Vec::as_slice)
    }

    /// Keywords present
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

/// Split a comma-separated list value into trimmed, non-empty items
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{GrammarPolicy, IncludeRef};

    struct Scoped;

    impl DirectiveGrammar for Scoped {
        fn name(&self) -> &'static str {
            "scoped"
        }

        fn policy(&self) -> GrammarPolicy {
            GrammarPolicy::Strict
        }

        fn include(&self, _line: &str) -> Option<IncludeRef> {
            None
        }

        fn classify(&self, _line: &str) -> Result<(DirectiveKind, Vec<String>), String> {
            Err("unused".to_string())
        }
    }

    impl ScopedGrammar for Scoped {
        fn key_policy(&self, key: &str) -> KeyPolicy {
            if key == "HostKey" {
                KeyPolicy::Append { separator: "," }
            } else {
                KeyPolicy::FirstWins
            }
        }

        fn criteria_key(&self) -> &'static str {
            "Match"
        }
    }

    fn directive(file: &str, line: usize, kind: DirectiveKind, tokens: &[&str]) -> Directive {
        Directive {
            source_file: Path::new(file).to_path_buf(),
            line_number: line,
            kind,
            raw: tokens.join(" "),
            tokens: tokens.iter().map(ToString::to_string).collect(),
            depth: 0,
        }
    }

    fn nested(depth: usize, directive: Directive) -> Directive {
        Directive { depth, ..directive }
    }

    fn kv(file: &str, line: usize, key: &str, value: &str) -> Directive {
        directive(file, line, DirectiveKind::KeyValue, &[key, value])
    }

    #[test]
    fn test_first_occurrence_wins_globally() {
        let stream = [kv("/a", 1, "Port", "22"), kv("/b", 1, "Port", "2222")];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        assert_eq!(config.global_params["Port"], "22");
        assert!(config.blocks.is_empty());
        assert!(!config.global_params.contains_key("Match"));
    }

    #[test]
    fn test_append_policy_accumulates() {
        let stream = [
            kv("/a", 1, "HostKey", "/etc/ssh/ssh_host_rsa_key"),
            kv("/a", 2, "HostKey", "/etc/ssh/ssh_host_ed25519_key"),
        ];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        assert_eq!(
            config.global_params["HostKey"],
            "/etc/ssh/ssh_host_rsa_key,/etc/ssh/ssh_host_ed25519_key"
        );
    }

    #[test]
    fn test_block_keys_do_not_leak() {
        let stream = [
            kv("/a", 1, "PermitRootLogin", "no"),
            directive("/a", 3, DirectiveKind::BlockHeader, &["Match", "User", "svc"]),
            kv("/a", 4, "AllowTcpForwarding", "no"),
            kv("/a", 5, "PermitRootLogin", "yes"),
            kv("/a", 6, "AllowTcpForwarding", "yes"),
        ];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        assert_eq!(config.global_params["PermitRootLogin"], "no");
        assert!(!config.global_params.contains_key("AllowTcpForwarding"));

        let block = &config.blocks[0];
        assert_eq!(block.criteria, "User svc");
        assert_eq!(block.params["AllowTcpForwarding"], "no");
        assert_eq!(block.params["PermitRootLogin"], "yes");
        assert_eq!(block.source_range.start_line, 3);
        assert_eq!(block.source_range.end_line, 6);
        assert_eq!(block.id, "sshd/User svc");
    }

    #[test]
    fn test_criteria_key_lists_all_blocks() {
        let stream = [
            directive("/a", 1, DirectiveKind::BlockHeader, &["Match", "User", "a"]),
            directive("/a", 3, DirectiveKind::BlockHeader, &["Match", "Group", "b"]),
            directive("/a", 5, DirectiveKind::BlockHeader, &["Match", "User", "a"]),
        ];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        assert_eq!(config.global_params["Match"], "User a,Group b,User a");
        let ids: Vec<_> = config.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["sshd/User a", "sshd/Group b", "sshd/User a#2"]);
    }

    #[test]
    fn test_block_range_stays_in_header_file() {
        let stream = [
            directive("/a", 2, DirectiveKind::BlockHeader, &["Match", "all"]),
            kv("/a", 3, "X11Forwarding", "no"),
            directive("/a", 4, DirectiveKind::Include, &["Include", "/b"]),
            nested(1, kv("/b", 9, "Banner", "none")),
        ];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        let block = &config.blocks[0];
        assert_eq!(block.source_range.end_line, 3);
        assert_eq!(block.params["Banner"], "none");
    }

    #[test]
    fn test_included_block_ends_with_its_file() {
        let stream = [
            directive("/main", 1, DirectiveKind::Include, &["Include", "/d/*.conf"]),
            nested(1, directive("/d/a.conf", 1, DirectiveKind::BlockHeader, &["Match", "Group", "sftp"])),
            nested(1, kv("/d/a.conf", 2, "ForceCommand", "internal-sftp")),
            nested(1, kv("/d/b.conf", 1, "Banner", "none")),
            kv("/main", 2, "PasswordAuthentication", "no"),
            directive("/main", 3, DirectiveKind::BlockHeader, &["Match", "User", "svc"]),
            directive("/main", 4, DirectiveKind::Include, &["Include", "/e.conf"]),
            nested(1, kv("/e.conf", 1, "X11Forwarding", "no")),
            kv("/main", 5, "PermitTTY", "no"),
        ];
        let config = OverrideResolver::new("sshd", &Scoped).flatten(&stream);

        assert_eq!(config.global_params["PasswordAuthentication"], "no");
        assert_eq!(config.global_params["Banner"], "none");
        assert_eq!(config.global_params["Match"], "Group sftp,User svc");

        let sftp = &config.blocks[0];
        assert_eq!(sftp.params.keys().collect::<Vec<_>>(), ["ForceCommand"]);
        assert_eq!(sftp.source_range.end_line, 2);

        let svc = &config.blocks[1];
        assert_eq!(svc.params["X11Forwarding"], "no");
        assert_eq!(svc.params["PermitTTY"], "no");
        assert_eq!(svc.source_range.end_line, 5);
    }

    #[test]
    fn test_collections_keep_duplicates() {
        let stream = [
            directive("/m", 1, DirectiveKind::ListEntry, &["blacklist", "usb_storage"]),
            directive("/m", 2, DirectiveKind::ListEntry, &["Blacklist", "usb_storage"]),
            directive("/m", 3, DirectiveKind::Include, &["include", "x"]),
            directive("/m", 4, DirectiveKind::ListEntry, &["options", "snd", "index=0"]),
        ];
        let collections = DirectiveCollections::from_directives(&stream);

        assert_eq!(collections.get("blacklist").len(), 2);
        assert_eq!(collections.get("options").len(), 1);
        assert!(collections.get("include").is_empty());
        assert_eq!(collections.keywords().collect::<Vec<_>>(), ["blacklist", "options"]);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("aes256-ctr, aes128-ctr,,chacha20-poly1305@openssh.com"),
            ["aes256-ctr", "aes128-ctr", "chacha20-poly1305@openssh.com"]
        );
        assert!(split_list("").is_empty());
    }
}
