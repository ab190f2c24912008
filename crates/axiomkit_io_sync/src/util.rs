use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use rayon::prelude::*;
use regex::Regex;

use crate::spec::{EnumSyncEntryKind, EnumSyncPatternMode, SyncTreeError};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeSyncPatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SpecSyncPatterns {
    pub(crate) patterns_ignore: Option<TypeSyncPatternSeq>,
}

impl SpecSyncPatterns {
    pub(crate) fn from_raw(
        patterns_ignore: Option<&[String]>,
        rule_pattern: EnumSyncPatternMode,
    ) -> Result<Self, SyncTreeError> {
        Ok(Self {
            patterns_ignore: _compile(patterns_ignore, rule_pattern)?,
        })
    }

    pub(crate) fn should_ignore(&self, name: &str) -> bool {
        _is_pattern_matching(name, self.patterns_ignore.as_ref())
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumSyncPatternMode,
) -> Result<Option<TypeSyncPatternSeq>, SyncTreeError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumSyncPatternMode::Literal => Ok(Some(TypeSyncPatternSeq::Literal(patterns.to_vec()))),
        EnumSyncPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| {
                        SyncTreeError::InvalidPattern(format!("Invalid ignore pattern: {e}"))
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeSyncPatternSeq::Glob(l_glob)))
        }
        EnumSyncPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| {
                    SyncTreeError::InvalidPattern(format!("Invalid ignore pattern: {e}"))
                })?;
                l_regex.push(regex);
            }
            Ok(Some(TypeSyncPatternSeq::Regex(l_regex)))
        }
    }
}

fn _is_pattern_matching(value: &str, patterns: Option<&TypeSyncPatternSeq>) -> bool {
    match patterns {
        None => false,
        Some(TypeSyncPatternSeq::Literal(v)) => v.iter().any(|p| value.contains(p.as_str())),
        Some(TypeSyncPatternSeq::Glob(v)) => v.iter().any(|p| p.is_match(value)),
        Some(TypeSyncPatternSeq::Regex(v)) => v.iter().any(|p| p.is_match(value)),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// (device, inode) of a directory, used to break symlink loops.
pub(crate) type TypeDirIdentity = (u64, u64);

#[cfg(unix)]
pub(crate) fn derive_dir_identity(meta: &fs::Metadata) -> Option<TypeDirIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
pub(crate) fn derive_dir_identity(_meta: &fs::Metadata) -> Option<TypeDirIdentity> {
    None
}

/// Kind of a source-side entry. Symlinks are followed.
pub(crate) fn detect_kind_src(path: &Path) -> EnumSyncEntryKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => EnumSyncEntryKind::Dir,
        Ok(meta) if meta.is_file() => EnumSyncEntryKind::File,
        _ => EnumSyncEntryKind::Other,
    }
}

/// Kind of a destination-side entry. Symlinks are never followed.
pub(crate) fn detect_kind_dst(path: &Path) -> EnumSyncEntryKind {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_dir() => EnumSyncEntryKind::Dir,
        Ok(meta) if meta.file_type().is_file() => EnumSyncEntryKind::File,
        _ => EnumSyncEntryKind::Other,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CopyAndRemove

pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
    if_preserve_metadata: bool,
) -> Result<(), io::Error> {
    fs::copy(path_file_src, path_file_dst)?;
    if if_preserve_metadata {
        let stat_src = fs::metadata(path_file_src)?;
        apply_metadata(&stat_src, path_file_dst)?;
        #[cfg(target_os = "linux")]
        copy_xattrs_linux(path_file_src, path_file_dst);
    }
    Ok(())
}

fn apply_metadata(stat_src: &fs::Metadata, path_dst: &Path) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    fs::set_permissions(path_dst, stat_src.permissions())?;

    let file_time_access = FileTime::from_last_access_time(stat_src);
    let file_time_modify = FileTime::from_last_modification_time(stat_src);
    set_file_times(path_dst, file_time_access, file_time_modify)
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

/// Problems collected while copying one subtree.
#[derive(Debug, Default)]
pub(crate) struct SpecSubtreeResult {
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
}

impl SpecSubtreeResult {
    fn merge(mut self, other: SpecSubtreeResult) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    fn from_error(message: String) -> Self {
        Self {
            errors: vec![message],
            warnings: Vec::new(),
        }
    }
}

/// Recursively copy `path_dir_src` to `path_dir_dst`.
///
/// Every directory is created before anything inside it is written, and its
/// permissions/times are applied after its children. Children whose name
/// matches `spec_pats` are skipped at every depth. Per-entry failures do not
/// stop the rest of the subtree; they are collected in the result.
pub(crate) fn copy_subtree(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    spec_pats: &SpecSyncPatterns,
    if_preserve_metadata: bool,
    if_parallel: bool,
    l_ancestors: &[TypeDirIdentity],
) -> SpecSubtreeResult {
    let stat_src = match fs::metadata(path_dir_src) {
        Ok(v) => v,
        Err(e) => {
            return SpecSubtreeResult::from_error(format!("{}: {e}", path_dir_src.display()));
        }
    };

    let mut l_ancestors_next = l_ancestors.to_vec();
    if let Some(tuple_identity) = derive_dir_identity(&stat_src) {
        if l_ancestors.contains(&tuple_identity) {
            return SpecSubtreeResult::from_error(format!(
                "Symlink loop detected: {}",
                path_dir_src.display()
            ));
        }
        l_ancestors_next.push(tuple_identity);
    }

    if let Err(e) = fs::create_dir(path_dir_dst)
        && !(e.kind() == io::ErrorKind::AlreadyExists && path_dir_dst.is_dir())
    {
        return SpecSubtreeResult::from_error(format!("{}: {e}", path_dir_dst.display()));
    }

    let mut spec_result = SpecSubtreeResult::default();
    let iter_entries = match fs::read_dir(path_dir_src) {
        Ok(v) => v,
        Err(e) => {
            return SpecSubtreeResult::from_error(format!("{}: {e}", path_dir_src.display()));
        }
    };
    let mut l_children: Vec<PathBuf> = Vec::new();
    for _entry_res in iter_entries {
        match _entry_res {
            Ok(entry) if spec_pats.should_ignore(&entry.file_name().to_string_lossy()) => {}
            Ok(entry) => l_children.push(entry.path()),
            Err(e) => spec_result.errors.push(format!(
                "Failed to read directory entry under {} ({e})",
                path_dir_src.display()
            )),
        }
    }

    let copy_child = |path_child_src: &PathBuf| -> SpecSubtreeResult {
        let Some(name) = path_child_src.file_name() else {
            return SpecSubtreeResult::default();
        };
        let path_child_dst = path_dir_dst.join(name);
        match detect_kind_src(path_child_src) {
            EnumSyncEntryKind::Dir => copy_subtree(
                path_child_src,
                &path_child_dst,
                spec_pats,
                if_preserve_metadata,
                if_parallel,
                &l_ancestors_next,
            ),
            EnumSyncEntryKind::File => {
                match copy_file_with_metadata(path_child_src, &path_child_dst, if_preserve_metadata)
                {
                    Ok(_) => SpecSubtreeResult::default(),
                    Err(e) => SpecSubtreeResult::from_error(format!(
                        "{} -> {}: {e}",
                        path_child_src.display(),
                        path_child_dst.display()
                    )),
                }
            }
            EnumSyncEntryKind::Other => SpecSubtreeResult {
                errors: Vec::new(),
                warnings: vec![format!(
                    "Special file skipped: {}",
                    path_child_src.display()
                )],
            },
        }
    };

    let spec_children = if if_parallel {
        l_children
            .par_iter()
            .map(copy_child)
            .reduce(SpecSubtreeResult::default, SpecSubtreeResult::merge)
    } else {
        l_children
            .iter()
            .map(copy_child)
            .fold(SpecSubtreeResult::default(), SpecSubtreeResult::merge)
    };
    spec_result = spec_result.merge(spec_children);

    if if_preserve_metadata && let Err(e) = apply_metadata(&stat_src, path_dir_dst) {
        spec_result
            .errors
            .push(format!("{}: {e}", path_dir_dst.display()));
    }
    spec_result
}

/// Remove one destination entry without following symlinks.
///
/// Returns whether the removed entry was a real directory.
pub(crate) fn remove_entry(path: &Path) -> Result<bool, io::Error> {
    let meta = fs::symlink_metadata(path)?;
    let cfg_file_type = meta.file_type();
    if cfg_file_type.is_dir() {
        fs::remove_dir_all(path)?;
        return Ok(true);
    }
    #[cfg(windows)]
    {
        if cfg_file_type.is_symlink() && path.is_dir() {
            fs::remove_dir(path)?;
            return Ok(false);
        }
    }
    fs::remove_file(path)?;
    Ok(false)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
