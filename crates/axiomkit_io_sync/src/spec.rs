//! Sync specification models, error taxonomy and top-level error types.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Conventional VCS/cache names that callers may choose to hide from both sides.
pub const DEFAULT_IGNORE_NAMES: [&str; 8] = [
    "RCS",
    "CVS",
    "tags",
    ".git",
    ".hg",
    ".bzr",
    "_darcs",
    "__pycache__",
];

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Pattern matching mode for ignore lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

/// How two regular files with the same name are judged identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncCompareMode {
    /// Equal (size, mtime) wins; otherwise equal sizes fall back to bytes.
    Shallow,
    /// Always compare bytes when sizes match.
    Content,
    /// Size and modification time only.
    Metadata,
}

/// Kind of one directory child as seen by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncEntryKind {
    /// Directory.
    Dir,
    /// Regular file.
    File,
    /// Anything else: special files, broken links, destination-side symlinks.
    Other,
}

impl EnumSyncEntryKind {
    pub fn is_dir(self) -> bool {
        self == Self::Dir
    }
}

/// Leaf or structural action kinds produced by one reconcile level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncActionKind {
    /// Copy a source-only file or subtree into the destination.
    Create,
    /// Overwrite a differing destination file.
    Update,
    /// Remove a destination-only file or subtree.
    Delete,
    /// Remove a destination entry of the wrong kind, then create from source.
    Replace,
    /// Create a missing destination directory before classification.
    CreateDestination,
    /// Descend into a common subdirectory. Only recorded when the subtree aborts.
    Recurse,
}

/// Error taxonomy for per-entry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumSyncErrorKind {
    /// Source directory vanished; the affected subtree is skipped.
    SourceMissing,
    /// Destination directory could not be created; the affected subtree is skipped.
    DestinationCreate,
    /// Create/update/replace copy failed.
    Copy,
    /// Delete failed.
    Delete,
    /// Directory listing failed; the affected subtree is skipped.
    ClassificationIo,
}

impl fmt::Display for EnumSyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_name = match self {
            Self::SourceMissing => "source_missing",
            Self::DestinationCreate => "destination_create",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::ClassificationIo => "classification_io",
        };
        f.write_str(c_name)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for `reconcile`.
#[derive(Debug, Clone)]
pub struct SpecSyncOptions {
    /// Names hidden from both sides; neither copied nor deleted.
    pub patterns_ignore: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumSyncPatternMode,
    /// File comparison mode.
    pub rule_compare: EnumSyncCompareMode,
    /// Maximum worker threads for action dispatch.
    pub num_workers_max: Option<usize>,
    /// Copy permissions, timestamps and extended attributes with content.
    pub if_preserve_metadata: bool,
    /// Do not mutate filesystem; record what would happen.
    pub if_dry_run: bool,
}

impl Default for SpecSyncOptions {
    fn default() -> Self {
        Self {
            patterns_ignore: None,
            rule_pattern: EnumSyncPatternMode::Glob,
            rule_compare: EnumSyncCompareMode::Shallow,
            num_workers_max: None,
            if_preserve_metadata: true,
            if_dry_run: false,
        }
    }
}

/// One level of the recursive walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDirPair {
    pub path_dir_src: PathBuf,
    pub path_dir_dst: PathBuf,
}

impl SpecDirPair {
    pub fn new<P, Q>(path_dir_src: P, path_dir_dst: Q) -> Self
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        Self {
            path_dir_src: path_dir_src.as_ref().to_path_buf(),
            path_dir_dst: path_dir_dst.as_ref().to_path_buf(),
        }
    }

    /// Pair for the child `name` on both sides.
    pub fn join<N: AsRef<Path>>(&self, name: N) -> Self {
        Self {
            path_dir_src: self.path_dir_src.join(name.as_ref()),
            path_dir_dst: self.path_dir_dst.join(name.as_ref()),
        }
    }
}

/// Cause attached to a failed outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncFailure {
    pub kind: EnumSyncErrorKind,
    /// User-facing error text.
    pub message: String,
}

impl SpecSyncFailure {
    pub fn new(kind: EnumSyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One path-scoped failure item in the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncError {
    /// Failed source or destination path.
    pub path: PathBuf,
    pub kind: EnumSyncErrorKind,
    /// User-facing error text.
    pub exception: String,
}

/// "Top-level call failed" errors (input validation / setup stage).
#[derive(Debug, Error)]
pub enum SyncTreeError {
    #[error("Source directory '{}' does not exist.", .0.display())]
    SourceMissing(PathBuf),
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        .path_src.display(),
        .path_dst.display()
    )]
    SourceDestinationOverlap {
        /// Normalized source directory.
        path_src: PathBuf,
        /// Normalized destination directory.
        path_dst: PathBuf,
    },
    #[error("Failed to initialize destination {}: {message}", .path.display())]
    DestinationInitFailed {
        /// Destination path that failed initialization.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
    #[error("{0}")]
    InvalidPattern(String),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
