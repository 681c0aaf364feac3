//! # confscope
//!
//! Reconstructs the effective configuration of services whose settings are
//! spread across a primary file, `Include`d files, globs and drop-in
//! directories: `sshd_config`, sudoers, `modprobe.d` and `pam.d`.
//!
//! Every resource runs the same pipeline: resolve the root path, collect the
//! include graph depth-first with cycle detection, tokenize each file with a
//! subsystem grammar, then flatten scoped parameters or group collections.
//! The result is parsed once per resource and cached, errors included.
//!
//! ```no_run
//! use std::sync::Arc;
//! use confscope::{LocalFs, Resource, SshdConfig};
//!
//! let sshd = SshdConfig::new(Arc::new(LocalFs::new()), None);
//! for file in sshd.files()? {
//!     println!("{}", file.display());
//! }
//! println!("{:?}", sshd.param("PermitRootLogin")?);
//! # Ok::<(), confscope::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod cache;
pub mod directive;
pub mod error;
pub mod fragments;
pub mod fs;
pub mod glob;
pub mod pipeline;
pub mod resolve;
pub mod resources;
pub mod settings;
pub mod source;


pub use aggregate::IncludeAggregator;
pub use cache::{ParseCache, ParseState};
pub use directive::{
    Diagnostic, Directive, DirectiveGrammar, DirectiveKind, DirectiveParser, GrammarPolicy,
    IncludeRef,
};
pub use error::{Error, Result};
pub use fragments::FragmentFilter;
pub use fs::{DirEntry, FileInfo, FileSystem, LocalFs, MemoryFs};
pub use glob::GlobExpander;
pub use pipeline::{ParsedConfig, Pipeline};
pub use resolve::{
    DirectiveCollections, EffectiveConfig, KeyPolicy, OverrideResolver, ScopedBlock,
    ScopedGrammar, SourceRange,
};
pub use resources::{
    Location, Modprobe, PamConf, PamEntry, Resource, SshdConfig, Sudoers, SudoersAlias,
    SudoersDefault, SudoersUserSpec,
};
pub use settings::{Settings, SettingsManager};
pub use source::{ConfigSource, DiscoveredVia, PathResolver, SourceSpec};
