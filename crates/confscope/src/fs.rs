//! Filesystem access used by every resource
//!
//! Resources never touch `std::fs` directly. They go through [`FileSystem`]
//! so the same pipeline can inspect the running host, a mounted image under
//! a sysroot, or an in-memory snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use walkdir::WalkDir;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    /// File name without the directory part
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// Result of [`FileSystem::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Whether the path is a directory
    pub is_dir: bool,
    /// Permission bits (`0` where the platform has none)
    pub mode: u32,
}

/// Read-only filesystem collaborator
///
/// Missing paths must be reported as [`io::ErrorKind::NotFound`].
pub trait FileSystem: Send + Sync {
    /// Read a whole file as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// List the direct entries of a directory, sorted by name
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or cannot be listed.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Describe a path
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist.
    fn stat(&self, path: &Path) -> io::Result<FileInfo>;
}

/// Local filesystem, optionally re-rooted under a sysroot
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    root: Option<PathBuf>,
}

impl LocalFs {
    /// Access the host filesystem as-is
    #[must_use]
    pub const fn new() -> Self {
        Self { root: None }
    }

    /// Resolve every absolute path under `root`
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be canonicalized.
    pub fn with_sysroot(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: Some(dunce::canonicalize(root)?),
        })
    }

    /// The sysroot in use, if any
    #[must_use]
    pub fn sysroot(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

impl FileSystem for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.host_path(path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let host = self.host_path(path);
        if !fs::metadata(&host)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", path.display()),
            ));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&host)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            // Symlinked directories still count as directories
            let is_dir = entry.file_type().is_dir()
                || (entry.path_is_symlink() && entry.path().is_dir());
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }

        Ok(entries)
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let metadata = fs::metadata(self.host_path(path))?;

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let mode = 0;

        Ok(FileInfo {
            is_dir: metadata.is_dir(),
            mode,
        })
    }
}

/// In-memory filesystem snapshot
///
/// Parent directories of every file are registered implicitly. The number of
/// file reads is counted so callers can observe how often a resource touched
/// its sources.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    reads: AtomicUsize,
}

impl MemoryFs {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (and its parent directories)
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
        self.files.insert(path, content.into());
        self
    }

    /// Add an empty directory (and its parents)
    #[must_use]
    pub fn with_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_dirs(&path.into());
        self
    }

    /// Number of successful and failed `read_to_string` calls so far
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn add_dirs(&mut self, dir: &Path) {
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )
    }
}

impl FileSystem for MemoryFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        if !self.dirs.contains(path) {
            return Err(Self::not_found(path));
        }

        let mut entries = BTreeMap::new();
        let children = self
            .files
            .keys()
            .map(|p| (p, false))
            .chain(self.dirs.iter().map(|p| (p, true)));
        for (child, is_dir) in children {
            if child.parent() == Some(path) {
                if let Some(name) = child.file_name() {
                    entries.insert(name.to_string_lossy().into_owned(), is_dir);
                }
            }
        }

        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        if self.files.contains_key(path) {
            Ok(FileInfo {
                is_dir: false,
                mode: 0o644,
            })
        } else if self.dirs.contains(path) {
            Ok(FileInfo {
                is_dir: true,
                mode: 0o755,
            })
        } else {
            Err(Self::not_found(path))
        }
    }
}
