//! Entry classification for one directory pair.
//!
//! Listing touches the filesystem; partitioning ([`partition_entries`]) is a
//! pure function of the two listings plus a file-equality callback.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use filetime::FileTime;

use crate::spec::{
    EnumSyncCompareMode, EnumSyncEntryKind, EnumSyncErrorKind, SpecDirPair, SpecSyncFailure,
    SpecSyncOptions, SyncTreeError,
};
use crate::util::{SpecSyncPatterns, detect_kind_dst, detect_kind_src};

const N_CMP_BUFSIZE: usize = 8 * 1024;

/// Immediate children of one directory, keyed by name.
pub type TypeEntryListing = BTreeMap<OsString, EnumSyncEntryKind>;

/// Disjoint name sets for one directory pair.
///
/// Every non-ignored child name of either directory lands in exactly one set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecClassification {
    /// In source only.
    pub create_only: BTreeSet<OsString>,
    /// In destination only.
    pub remove_only: BTreeSet<OsString>,
    /// Files on both sides with different content or metadata.
    pub differing: BTreeSet<OsString>,
    /// Files on both sides judged equal.
    pub identical: BTreeSet<OsString>,
    /// Directories on both sides.
    pub common_dirs: BTreeSet<OsString>,
    /// On both sides with incompatible kinds; replaced from source.
    pub mismatched: BTreeSet<OsString>,
    /// Source entry is neither file nor directory; left alone.
    pub unsupported: BTreeSet<OsString>,
    /// Source listing the sets were computed from.
    pub kinds_src: TypeEntryListing,
    /// Destination listing the sets were computed from.
    pub kinds_dst: TypeEntryListing,
    /// Non-fatal notes raised while comparing.
    pub warnings: Vec<String>,
}

impl SpecClassification {
    /// Count of names across all sets.
    pub fn len(&self) -> usize {
        self.create_only.len()
            + self.remove_only.len()
            + self.differing.len()
            + self.identical.len()
            + self.common_dirs.len()
            + self.mismatched.len()
            + self.unsupported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when this level needs no leaf action.
    pub fn is_in_sync(&self) -> bool {
        self.create_only.is_empty()
            && self.remove_only.is_empty()
            && self.differing.is_empty()
            && self.mismatched.is_empty()
    }
}

/// Partition two listings into a [`SpecClassification`].
///
/// `is_identical` is only consulted for names that are regular files on both
/// sides; it returns `Err(message)` when the comparison itself failed, in which
/// case the name is treated as differing and the message kept as a warning.
pub fn partition_entries<F>(
    map_src: TypeEntryListing,
    map_dst: TypeEntryListing,
    mut is_identical: F,
) -> SpecClassification
where
    F: FnMut(&OsStr) -> Result<bool, String>,
{
    let mut spec_cls = SpecClassification::default();

    for (name, &enum_kind_src) in &map_src {
        let Some(&enum_kind_dst) = map_dst.get(name) else {
            if enum_kind_src == EnumSyncEntryKind::Other {
                spec_cls.unsupported.insert(name.clone());
            } else {
                spec_cls.create_only.insert(name.clone());
            }
            continue;
        };

        match (enum_kind_src, enum_kind_dst) {
            (EnumSyncEntryKind::Other, _) => {
                spec_cls.unsupported.insert(name.clone());
            }
            (EnumSyncEntryKind::Dir, EnumSyncEntryKind::Dir) => {
                spec_cls.common_dirs.insert(name.clone());
            }
            (EnumSyncEntryKind::File, EnumSyncEntryKind::File) => {
                match is_identical(name.as_os_str()) {
                    Ok(true) => {
                        spec_cls.identical.insert(name.clone());
                    }
                    Ok(false) => {
                        spec_cls.differing.insert(name.clone());
                    }
                    Err(message) => {
                        spec_cls.warnings.push(message);
                        spec_cls.differing.insert(name.clone());
                    }
                }
            }
            _ => {
                spec_cls.mismatched.insert(name.clone());
            }
        }
    }

    for name in map_dst.keys() {
        if !map_src.contains_key(name) {
            spec_cls.remove_only.insert(name.clone());
        }
    }

    spec_cls.kinds_src = map_src;
    spec_cls.kinds_dst = map_dst;
    spec_cls
}

/// Decide whether two regular files are equal under `rule_compare`.
pub fn compare_files(
    path_file_a: &Path,
    path_file_b: &Path,
    rule_compare: EnumSyncCompareMode,
) -> Result<bool, io::Error> {
    let stat_a = fs::metadata(path_file_a)?;
    let stat_b = fs::metadata(path_file_b)?;
    if stat_a.len() != stat_b.len() {
        return Ok(false);
    }

    let b_same_mtime = FileTime::from_last_modification_time(&stat_a)
        == FileTime::from_last_modification_time(&stat_b);
    match rule_compare {
        EnumSyncCompareMode::Metadata => Ok(b_same_mtime),
        EnumSyncCompareMode::Shallow if b_same_mtime => Ok(true),
        EnumSyncCompareMode::Shallow | EnumSyncCompareMode::Content => {
            _compare_bytes(path_file_a, path_file_b)
        }
    }
}

fn _compare_bytes(path_file_a: &Path, path_file_b: &Path) -> Result<bool, io::Error> {
    let mut file_a = fs::File::open(path_file_a)?;
    let mut file_b = fs::File::open(path_file_b)?;
    let mut buf_a = vec![0_u8; N_CMP_BUFSIZE];
    let mut buf_b = vec![0_u8; N_CMP_BUFSIZE];

    loop {
        let n_a = _read_full(&mut file_a, &mut buf_a)?;
        let n_b = _read_full(&mut file_b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

fn _read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, io::Error> {
    let mut n_filled = 0;
    while n_filled < buf.len() {
        match reader.read(&mut buf[n_filled..]) {
            Ok(0) => break,
            Ok(n) => n_filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n_filled)
}

/// Classifier configured once per run and shared by every level.
#[derive(Debug, Clone)]
pub struct SyncClassifier {
    spec_pats: SpecSyncPatterns,
    rule_compare: EnumSyncCompareMode,
}

impl SyncClassifier {
    pub fn new(spec_sync_options: &SpecSyncOptions) -> Result<Self, SyncTreeError> {
        Ok(Self {
            spec_pats: SpecSyncPatterns::from_raw(
                spec_sync_options.patterns_ignore.as_deref(),
                spec_sync_options.rule_pattern,
            )?,
            rule_compare: spec_sync_options.rule_compare,
        })
    }

    pub(crate) fn patterns(&self) -> &SpecSyncPatterns {
        &self.spec_pats
    }

    /// Classify the immediate children of both directories of `spec_pair`.
    pub fn classify(
        &self,
        spec_pair: &SpecDirPair,
    ) -> Result<SpecClassification, SpecSyncFailure> {
        let map_src = self.list_source(&spec_pair.path_dir_src)?;
        let map_dst = self.list_destination(&spec_pair.path_dir_dst)?;
        Ok(self.partition(spec_pair, map_src, map_dst))
    }

    /// Classify against an empty destination (dry run over a missing directory).
    pub fn classify_missing_destination(
        &self,
        spec_pair: &SpecDirPair,
    ) -> Result<SpecClassification, SpecSyncFailure> {
        let map_src = self.list_source(&spec_pair.path_dir_src)?;
        Ok(self.partition(spec_pair, map_src, TypeEntryListing::new()))
    }

    fn partition(
        &self,
        spec_pair: &SpecDirPair,
        map_src: TypeEntryListing,
        map_dst: TypeEntryListing,
    ) -> SpecClassification {
        partition_entries(map_src, map_dst, |name| {
            let path_file_src = spec_pair.path_dir_src.join(name);
            let path_file_dst = spec_pair.path_dir_dst.join(name);
            compare_files(&path_file_src, &path_file_dst, self.rule_compare).map_err(|e| {
                format!(
                    "Failed to compare '{}' with '{}' ({e}); treating as differing.",
                    path_file_src.display(),
                    path_file_dst.display()
                )
            })
        })
    }

    pub fn list_source(&self, path_dir: &Path) -> Result<TypeEntryListing, SpecSyncFailure> {
        self.list_entries(path_dir, detect_kind_src)
    }

    pub fn list_destination(&self, path_dir: &Path) -> Result<TypeEntryListing, SpecSyncFailure> {
        self.list_entries(path_dir, detect_kind_dst)
    }

    fn list_entries(
        &self,
        path_dir: &Path,
        detect_kind: fn(&Path) -> EnumSyncEntryKind,
    ) -> Result<TypeEntryListing, SpecSyncFailure> {
        let to_failure = |e: io::Error| {
            SpecSyncFailure::new(
                EnumSyncErrorKind::ClassificationIo,
                format!("Failed to read directory {} ({e})", path_dir.display()),
            )
        };

        let mut map_entries = TypeEntryListing::new();
        for _entry_res in fs::read_dir(path_dir).map_err(to_failure)? {
            let entry = _entry_res.map_err(to_failure)?;
            let name = entry.file_name();
            if self.spec_pats.should_ignore(&name.to_string_lossy()) {
                continue;
            }
            map_entries.insert(name, detect_kind(&entry.path()));
        }
        Ok(map_entries)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::ffi::OsString;
    use std::fs;

    use filetime::{FileTime, set_file_mtime};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::{SyncClassifier, TypeEntryListing, compare_files, partition_entries};
    use crate::spec::{
        EnumSyncCompareMode, EnumSyncEntryKind, EnumSyncErrorKind, SpecDirPair, SpecSyncOptions,
    };

    fn listing(l_items: &[(&str, EnumSyncEntryKind)]) -> TypeEntryListing {
        l_items
            .iter()
            .map(|(name, kind)| (OsString::from(name), *kind))
            .collect()
    }

    fn names(set_names: &BTreeSet<OsString>) -> Vec<String> {
        set_names
            .iter()
            .map(|v| v.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn partition_covers_every_name_exactly_once() {
        use EnumSyncEntryKind::{Dir, File, Other};

        let map_src = listing(&[
            ("new.txt", File),
            ("new_dir", Dir),
            ("same.txt", File),
            ("changed.txt", File),
            ("shared", Dir),
            ("was_file", Dir),
            ("fifo", Other),
        ]);
        let map_dst = listing(&[
            ("old.txt", File),
            ("same.txt", File),
            ("changed.txt", File),
            ("shared", Dir),
            ("was_file", File),
            ("fifo", File),
        ]);

        let set_union: BTreeSet<OsString> =
            map_src.keys().chain(map_dst.keys()).cloned().collect();
        let spec_cls = partition_entries(map_src, map_dst, |name| {
            Ok(name.to_string_lossy() == "same.txt")
        });

        assert_eq!(names(&spec_cls.create_only), vec!["new.txt", "new_dir"]);
        assert_eq!(names(&spec_cls.remove_only), vec!["old.txt"]);
        assert_eq!(names(&spec_cls.identical), vec!["same.txt"]);
        assert_eq!(names(&spec_cls.differing), vec!["changed.txt"]);
        assert_eq!(names(&spec_cls.common_dirs), vec!["shared"]);
        assert_eq!(names(&spec_cls.mismatched), vec!["was_file"]);
        assert_eq!(names(&spec_cls.unsupported), vec!["fifo"]);
        assert_eq!(spec_cls.len(), set_union.len());
        assert_eq!(spec_cls.kinds_src[&OsString::from("was_file")], Dir);
        assert_eq!(spec_cls.kinds_dst[&OsString::from("was_file")], File);
    }

    #[test]
    fn partition_compare_failure_becomes_differing_with_warning() {
        let map_src = listing(&[("a.txt", EnumSyncEntryKind::File)]);
        let map_dst = listing(&[("a.txt", EnumSyncEntryKind::File)]);

        let spec_cls = partition_entries(map_src, map_dst, |_| Err("boom".to_string()));
        assert_eq!(names(&spec_cls.differing), vec!["a.txt"]);
        assert_eq!(spec_cls.warnings, vec!["boom".to_string()]);
    }

    #[test]
    fn compare_modes_follow_signature_then_bytes() {
        let tmp = TempDir::new().expect("tempdir");
        let path_a = tmp.path().join("a.txt");
        let path_b = tmp.path().join("b.txt");
        fs::write(&path_a, "abc").expect("write");
        fs::write(&path_b, "abd").expect("write");
        let file_time = FileTime::from_unix_time(1_700_000_000, 0);
        set_file_mtime(&path_a, file_time).expect("mtime");
        set_file_mtime(&path_b, file_time).expect("mtime");

        // Same size and mtime: shallow and metadata trust the signature.
        assert!(compare_files(&path_a, &path_b, EnumSyncCompareMode::Shallow).expect("cmp"));
        assert!(compare_files(&path_a, &path_b, EnumSyncCompareMode::Metadata).expect("cmp"));
        assert!(!compare_files(&path_a, &path_b, EnumSyncCompareMode::Content).expect("cmp"));

        // Different mtime: shallow falls back to bytes.
        set_file_mtime(&path_b, FileTime::from_unix_time(1_700_000_100, 0)).expect("mtime");
        assert!(!compare_files(&path_a, &path_b, EnumSyncCompareMode::Shallow).expect("cmp"));
        fs::write(&path_b, "abc").expect("write");
        assert!(compare_files(&path_a, &path_b, EnumSyncCompareMode::Shallow).expect("cmp"));
        assert!(!compare_files(&path_a, &path_b, EnumSyncCompareMode::Metadata).expect("cmp"));

        fs::write(&path_b, "abcd").expect("write");
        assert!(!compare_files(&path_a, &path_b, EnumSyncCompareMode::Content).expect("cmp"));
    }

    #[test]
    fn compare_bytes_across_buffer_boundary() {
        let tmp = TempDir::new().expect("tempdir");
        let path_a = tmp.path().join("a.bin");
        let path_b = tmp.path().join("b.bin");
        let mut raw = vec![7_u8; 20_000];
        fs::write(&path_a, &raw).expect("write");
        raw[19_999] = 8;
        fs::write(&path_b, &raw).expect("write");
        assert!(!compare_files(&path_a, &path_b, EnumSyncCompareMode::Content).expect("cmp"));
    }

    #[test]
    fn classifier_hides_ignored_names_on_both_sides() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(src.join(".git")).expect("mkdir");
        fs::create_dir_all(dst.join("__pycache__")).expect("mkdir");
        fs::write(src.join("keep.txt"), "k").expect("write");

        let spec_sync_options = SpecSyncOptions {
            patterns_ignore: Some(vec![".git".to_string(), "__pycache__".to_string()]),
            ..SpecSyncOptions::default()
        };
        let classifier = SyncClassifier::new(&spec_sync_options).expect("classifier");
        let spec_cls = classifier
            .classify(&SpecDirPair::new(&src, &dst))
            .expect("classify");

        assert_eq!(names(&spec_cls.create_only), vec!["keep.txt"]);
        assert_eq!(spec_cls.len(), 1);
    }

    #[test]
    fn classifier_reports_missing_directory_as_classification_io() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");

        let classifier = SyncClassifier::new(&SpecSyncOptions::default()).expect("classifier");
        let failure = classifier
            .classify(&SpecDirPair::new(&src, tmp.path().join("gone")))
            .expect_err("missing destination");
        assert_eq!(failure.kind, EnumSyncErrorKind::ClassificationIo);

        let spec_cls = classifier
            .classify_missing_destination(&SpecDirPair::new(&src, tmp.path().join("gone")))
            .expect("dry classify");
        assert!(spec_cls.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn classifier_treats_destination_symlink_as_mismatch() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        let outside = tmp.path().join("outside");
        fs::create_dir_all(src.join("data")).expect("mkdir");
        fs::create_dir_all(&dst).expect("mkdir");
        fs::create_dir_all(&outside).expect("mkdir");
        symlink(&outside, dst.join("data")).expect("symlink");

        let classifier = SyncClassifier::new(&SpecSyncOptions::default()).expect("classifier");
        let spec_cls = classifier
            .classify(&SpecDirPair::new(&src, &dst))
            .expect("classify");
        assert_eq!(names(&spec_cls.mismatched), vec!["data"]);
        assert!(spec_cls.common_dirs.is_empty());
    }
}
