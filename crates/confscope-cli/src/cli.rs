use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Effective service configuration inspector
///
/// Follows includes, globs and drop-in directories the way each service
/// does and prints the resulting configuration
#[derive(Parser, Debug)]
#[command(name = "confscope")]
#[command(about, long_about = None, version)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use specific settings file
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Ignore all settings files
    #[arg(long, global = true, conflicts_with = "config")]
    pub no_config: bool,

    /// Read every absolute path under this directory
    #[arg(long, global = true, value_name = "PATH", env = "CONFSCOPE_SYSROOT")]
    pub sysroot: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// OpenSSH server configuration
    Sshd {
        /// Primary file (default: /etc/ssh/sshd_config)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Field to print
        #[arg(value_enum)]
        field: SshdField,
    },

    /// sudo policy
    Sudoers {
        /// Primary file (default: /etc/sudoers)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Host name substituted for %h in include paths
        #[arg(long, value_name = "NAME")]
        hostname: Option<String>,

        /// Field to print
        #[arg(value_enum)]
        field: SudoersField,
    },

    /// Kernel module loading rules
    Modprobe {
        /// Directory or file (default: /etc/modprobe.d)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Field to print
        #[arg(value_enum)]
        field: ModprobeField,
    },

    /// PAM service stacks
    Pam {
        /// Service directory (default: /etc/pam.d)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Only this service
        #[arg(long, value_name = "NAME")]
        service: Option<String>,

        /// Field to print
        #[arg(value_enum)]
        field: PamField,
    },

    /// Show the merged tool settings
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SshdField {
    /// Contributing files in discovery order
    Files,
    /// Raw content of every contributing file
    Content,
    /// Effective global parameters
    Params,
    /// Match blocks with their parameters
    Blocks,
    /// Ciphers list
    Ciphers,
    /// MACs list
    Macs,
    /// KexAlgorithms list
    Kexs,
    /// Every HostKey
    HostKeys,
    /// Hash of the contributing paths
    Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SudoersField {
    /// Contributing files in discovery order
    Files,
    /// Raw content of every contributing file
    Content,
    /// Defaults entries
    Defaults,
    /// Alias definitions
    Aliases,
    /// User specifications
    UserSpecs,
    /// Hash of the contributing paths
    Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModprobeField {
    /// Contributing files in discovery order
    Files,
    /// Raw content of every contributing file
    Content,
    /// Blacklisted modules
    Blacklist,
    /// Module options
    Options,
    /// Module aliases
    Aliases,
    /// Install commands
    Install,
    /// Remove commands
    Remove,
    /// Soft dependencies
    Softdeps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PamField {
    /// Contributing files in discovery order
    Files,
    /// Raw content of every contributing file
    Content,
    /// Stack entries in evaluation order
    Entries,
}
