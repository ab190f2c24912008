//! Directory walk, per-level task groups and outcome aggregation.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::action::{SpecApplyContext, SpecSyncAction, apply_action, plan_actions};
use crate::classify::{SpecClassification, SyncClassifier};
use crate::report::{ReportSync, ReportSyncBuilder, SpecSyncOutcome};
use crate::sink::{SinkTracing, SyncSink};
use crate::spec::{
    EnumSyncActionKind, EnumSyncErrorKind, SpecDirPair, SpecSyncFailure, SpecSyncOptions,
    SyncTreeError,
};
use crate::util::{TypeDirIdentity, calculate_worker_limit, derive_dir_identity, is_overlap};

/// Worker stack size. The walk and subtree copy recurse once per directory
/// level; 32 MiB covers several thousand levels in unoptimized builds.
const N_WORKER_STACK_SIZE: usize = 32 * 1024 * 1024;

struct SyncContext<'a> {
    classifier: SyncClassifier,
    spec_sync_options: SpecSyncOptions,
    if_parallel: bool,
    builder_sync_report: Mutex<ReportSyncBuilder>,
    sink: &'a dyn SyncSink,
}

impl SyncContext<'_> {
    fn record_outcome(&self, spec_outcome: SpecSyncOutcome) {
        self.sink.on_outcome(&spec_outcome);
        self.builder_sync_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_outcome(spec_outcome);
    }

    fn record_warning(&self, message: String) {
        self.sink.on_warning(&message);
        self.builder_sync_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_warning(message);
    }

    fn record_failure(
        &self,
        kind_action: EnumSyncActionKind,
        spec_pair: &SpecDirPair,
        spec_failure: SpecSyncFailure,
    ) {
        self.record_outcome(SpecSyncOutcome {
            action: SpecSyncAction::for_pair(kind_action, spec_pair),
            result: Err(spec_failure),
            if_dry_run: self.spec_sync_options.if_dry_run,
        });
    }
}

/// One unit of a level's task group.
enum TypeSyncTask<'a> {
    Action(&'a SpecSyncAction),
    Descend(&'a SpecDirPair),
}

/// Make `dir_destination` mirror `dir_source`, logging through `tracing`.
///
/// See [`reconcile_with_sink`].
pub fn reconcile<P, Q>(
    dir_source: P,
    dir_destination: Q,
    spec_sync_options: SpecSyncOptions,
) -> Result<ReportSync, SyncTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    reconcile_with_sink(dir_source, dir_destination, spec_sync_options, &SinkTracing)
}

/// Make `dir_destination` mirror `dir_source`.
///
/// This function performs:
/// 1. Root validation (source exists and is a directory, no overlap, valid patterns).
/// 2. Destination root creation.
/// 3. Per level: classify, plan, then run leaf actions and descents into common
///    subdirectories as one task group (serial or rayon thread pool). A level
///    returns only after its whole group has completed.
/// 4. Report aggregation.
///
/// Per-entry failures never abort the run; they become failed outcomes in the
/// report and are passed to `sink`. Returns [`SyncTreeError`] only when the run
/// cannot begin.
pub fn reconcile_with_sink<P, Q>(
    dir_source: P,
    dir_destination: Q,
    spec_sync_options: SpecSyncOptions,
    sink: &dyn SyncSink,
) -> Result<ReportSync, SyncTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let time_start = Instant::now();
    let spec_pair = SpecDirPair::new(dir_source, dir_destination);

    if !spec_pair.path_dir_src.exists() {
        return Err(SyncTreeError::SourceMissing(spec_pair.path_dir_src));
    }
    if !spec_pair.path_dir_src.is_dir() {
        return Err(SyncTreeError::SourceNotDirectory(spec_pair.path_dir_src));
    }
    if is_overlap(&spec_pair.path_dir_src, &spec_pair.path_dir_dst) {
        return Err(SyncTreeError::SourceDestinationOverlap {
            path_src: spec_pair.path_dir_src,
            path_dst: spec_pair.path_dir_dst,
        });
    }
    let classifier = SyncClassifier::new(&spec_sync_options)?;

    let if_dst_root_missing = match fs::metadata(&spec_pair.path_dir_dst) {
        Ok(meta) if meta.is_dir() => false,
        Ok(_) => {
            return Err(SyncTreeError::DestinationInitFailed {
                path: spec_pair.path_dir_dst,
                message: "Destination exists and is not a directory.".to_string(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            return Err(SyncTreeError::DestinationInitFailed {
                path: spec_pair.path_dir_dst,
                message: e.to_string(),
            });
        }
    };

    let if_dry_run = spec_sync_options.if_dry_run;
    let if_dst_root_created = if_dst_root_missing && !if_dry_run;
    if if_dst_root_created {
        fs::create_dir_all(&spec_pair.path_dir_dst).map_err(|e| {
            SyncTreeError::DestinationInitFailed {
                path: spec_pair.path_dir_dst.clone(),
                message: e.to_string(),
            }
        })?;
    }

    sink.on_start(&spec_pair);
    let n_workers_max = calculate_worker_limit(spec_sync_options.num_workers_max);
    let mut spec_sync_ctx = SyncContext {
        classifier,
        spec_sync_options,
        if_parallel: n_workers_max > 1,
        builder_sync_report: Mutex::new(ReportSyncBuilder::default()),
        sink,
    };

    if if_dst_root_created {
        spec_sync_ctx.record_outcome(SpecSyncOutcome {
            action: SpecSyncAction::for_pair(EnumSyncActionKind::CreateDestination, &spec_pair),
            result: Ok(()),
            if_dry_run,
        });
    }

    // A single-worker run still goes through the pool to get the larger stack.
    match ThreadPoolBuilder::new()
        .num_threads(n_workers_max)
        .stack_size(N_WORKER_STACK_SIZE)
        .build()
    {
        Ok(thread_pool) => {
            thread_pool.install(|| reconcile_dir(&spec_sync_ctx, &spec_pair, &[]));
        }
        Err(_) => {
            spec_sync_ctx.record_warning(format!(
                "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial sync."
            ));
            spec_sync_ctx.if_parallel = false;
            reconcile_dir(&spec_sync_ctx, &spec_pair, &[]);
        }
    }

    let builder_sync_report = spec_sync_ctx
        .builder_sync_report
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    let report = builder_sync_report.build(time_start.elapsed(), if_dry_run);
    sink.on_finish(&report);
    Ok(report)
}

/// Reconcile one directory pair and, through its task group, all descendants.
fn reconcile_dir(
    spec_sync_ctx: &SyncContext<'_>,
    spec_pair: &SpecDirPair,
    l_ancestors: &[TypeDirIdentity],
) {
    let if_dry_run = spec_sync_ctx.spec_sync_options.if_dry_run;

    let stat_src = match fs::metadata(&spec_pair.path_dir_src) {
        Ok(meta) if meta.is_dir() => meta,
        Ok(_) => {
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::Recurse,
                spec_pair,
                SpecSyncFailure::new(
                    EnumSyncErrorKind::SourceMissing,
                    "Source is no longer a directory.",
                ),
            );
            return;
        }
        Err(e) => {
            let kind_error = if e.kind() == io::ErrorKind::NotFound {
                EnumSyncErrorKind::SourceMissing
            } else {
                EnumSyncErrorKind::ClassificationIo
            };
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::Recurse,
                spec_pair,
                SpecSyncFailure::new(
                    kind_error,
                    format!(
                        "Source directory '{}' does not exist ({e}).",
                        spec_pair.path_dir_src.display()
                    ),
                ),
            );
            return;
        }
    };

    let mut l_ancestors_next = l_ancestors.to_vec();
    if let Some(tuple_identity) = derive_dir_identity(&stat_src) {
        if l_ancestors.contains(&tuple_identity) {
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::Recurse,
                spec_pair,
                SpecSyncFailure::new(
                    EnumSyncErrorKind::ClassificationIo,
                    format!(
                        "Symlink loop detected: {}",
                        spec_pair.path_dir_src.display()
                    ),
                ),
            );
            return;
        }
        l_ancestors_next.push(tuple_identity);
    }

    let res_cls = match ensure_destination_dir(spec_sync_ctx, spec_pair) {
        Ok(true) => spec_sync_ctx.classifier.classify(spec_pair),
        Ok(false) => spec_sync_ctx
            .classifier
            .classify_missing_destination(spec_pair),
        Err(()) => return,
    };
    let spec_cls = match res_cls {
        Ok(v) => v,
        Err(spec_failure) => {
            spec_sync_ctx.record_failure(EnumSyncActionKind::Recurse, spec_pair, spec_failure);
            return;
        }
    };
    record_classification(spec_sync_ctx, spec_pair, &spec_cls);

    let spec_plan = plan_actions(spec_pair, &spec_cls);
    tracing::debug!(
        "{}: {} actions, {} subdirectories",
        spec_pair.path_dir_dst.display(),
        spec_plan.actions.len(),
        spec_plan.descend.len()
    );
    if spec_plan.is_empty() {
        return;
    }

    let l_tasks: Vec<TypeSyncTask<'_>> = spec_plan
        .actions
        .iter()
        .map(TypeSyncTask::Action)
        .chain(spec_plan.descend.iter().map(TypeSyncTask::Descend))
        .collect();

    let spec_apply_ctx = SpecApplyContext {
        spec_pats: spec_sync_ctx.classifier.patterns(),
        if_preserve_metadata: spec_sync_ctx.spec_sync_options.if_preserve_metadata,
        if_parallel: spec_sync_ctx.if_parallel,
        l_ancestors: &l_ancestors_next,
    };
    let run_task = |spec_task: &TypeSyncTask<'_>| match spec_task {
        TypeSyncTask::Action(spec_action) => {
            if if_dry_run {
                spec_sync_ctx.record_outcome(SpecSyncOutcome {
                    action: (*spec_action).clone(),
                    result: Ok(()),
                    if_dry_run,
                });
                return;
            }
            let spec_apply = apply_action(spec_action, spec_apply_ctx);
            for message in spec_apply.warnings {
                spec_sync_ctx.record_warning(message);
            }
            spec_sync_ctx.record_outcome(SpecSyncOutcome {
                action: (*spec_action).clone(),
                result: spec_apply.result,
                if_dry_run,
            });
        }
        TypeSyncTask::Descend(spec_pair_child) => {
            reconcile_dir(spec_sync_ctx, spec_pair_child, &l_ancestors_next);
        }
    };

    if spec_sync_ctx.if_parallel {
        l_tasks.par_iter().for_each(run_task);
    } else {
        l_tasks.iter().for_each(run_task);
    }
}

/// Returns whether the destination directory exists afterwards.
///
/// A dry run reports the creation and answers `false`; a failed creation is
/// recorded and answers `Err`.
fn ensure_destination_dir(
    spec_sync_ctx: &SyncContext<'_>,
    spec_pair: &SpecDirPair,
) -> Result<bool, ()> {
    let if_dry_run = spec_sync_ctx.spec_sync_options.if_dry_run;
    match fs::symlink_metadata(&spec_pair.path_dir_dst) {
        Ok(meta) if meta.is_dir() => return Ok(true),
        Ok(meta) if meta.file_type().is_symlink() && spec_pair.path_dir_dst.is_dir() => {
            // Only reachable for the root, which callers may point through a link.
            return Ok(true);
        }
        Ok(_) => {
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::CreateDestination,
                spec_pair,
                SpecSyncFailure::new(
                    EnumSyncErrorKind::DestinationCreate,
                    "Destination exists and is not a directory.",
                ),
            );
            return Err(());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::CreateDestination,
                spec_pair,
                SpecSyncFailure::new(EnumSyncErrorKind::DestinationCreate, e.to_string()),
            );
            return Err(());
        }
    }

    if if_dry_run {
        spec_sync_ctx.record_outcome(SpecSyncOutcome {
            action: SpecSyncAction::for_pair(EnumSyncActionKind::CreateDestination, spec_pair),
            result: Ok(()),
            if_dry_run,
        });
        return Ok(false);
    }
    match fs::create_dir_all(&spec_pair.path_dir_dst) {
        Ok(_) => {
            spec_sync_ctx.record_outcome(SpecSyncOutcome {
                action: SpecSyncAction::for_pair(EnumSyncActionKind::CreateDestination, spec_pair),
                result: Ok(()),
                if_dry_run,
            });
            Ok(true)
        }
        Err(e) => {
            spec_sync_ctx.record_failure(
                EnumSyncActionKind::CreateDestination,
                spec_pair,
                SpecSyncFailure::new(EnumSyncErrorKind::DestinationCreate, e.to_string()),
            );
            Err(())
        }
    }
}

fn record_classification(
    spec_sync_ctx: &SyncContext<'_>,
    spec_pair: &SpecDirPair,
    spec_cls: &SpecClassification,
) {
    for message in &spec_cls.warnings {
        spec_sync_ctx.record_warning(message.clone());
    }
    for name in &spec_cls.unsupported {
        spec_sync_ctx.record_warning(format!(
            "Special file skipped: {}",
            spec_pair.path_dir_src.join(name).display()
        ));
    }

    let mut builder_sync_report = spec_sync_ctx
        .builder_sync_report
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    builder_sync_report.add_recursed();
    builder_sync_report.add_identical(spec_cls.identical.len() as u64);
    builder_sync_report.add_unsupported(spec_cls.unsupported.len() as u64);
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::{SyncContext, reconcile, reconcile_dir, reconcile_with_sink};
    use crate::classify::SyncClassifier;
    use crate::report::ReportSyncBuilder;
    use crate::sink::SinkCollect;
    use crate::spec::{
        EnumSyncActionKind, EnumSyncErrorKind, SpecDirPair, SpecSyncOptions, SyncTreeError,
    };

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, txt).expect("write");
    }

    fn options_serial() -> SpecSyncOptions {
        SpecSyncOptions {
            num_workers_max: Some(1),
            ..SpecSyncOptions::default()
        }
    }

    fn ctx_collect(sink: &SinkCollect) -> SyncContext<'_> {
        let spec_sync_options = options_serial();
        SyncContext {
            classifier: SyncClassifier::new(&spec_sync_options).expect("classifier"),
            spec_sync_options,
            if_parallel: false,
            builder_sync_report: Mutex::new(ReportSyncBuilder::default()),
            sink,
        }
    }

    #[test]
    fn reconcile_smoke_basic() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "a");
        write_text(&src.join("sub/b.txt"), "b");

        let report = reconcile(&src, &dst, SpecSyncOptions::default()).expect("reconcile");
        assert_eq!(report.cnt_created, 2);
        assert!(!report.has_failures());
        assert_eq!(fs::read_to_string(dst.join("sub/b.txt")).expect("read"), "b");
        assert_eq!(
            report.outcomes[0].action.kind,
            EnumSyncActionKind::CreateDestination
        );
    }

    #[test]
    fn reconcile_rejects_missing_source_without_touching_destination() {
        let tmp = TempDir::new().expect("tempdir");
        let dst = tmp.path().join("dst");

        let err = reconcile(tmp.path().join("nope"), &dst, options_serial())
            .expect_err("missing source");
        assert!(matches!(err, SyncTreeError::SourceMissing(_)));
        assert!(!dst.exists());
    }

    #[test]
    fn reconcile_rejects_overlap_and_file_source() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        write_text(&src.join("f.txt"), "f");

        let err = reconcile(&src, src.join("inner"), options_serial()).expect_err("overlap");
        assert!(matches!(err, SyncTreeError::SourceDestinationOverlap { .. }));

        let err = reconcile(src.join("f.txt"), tmp.path().join("dst"), options_serial())
            .expect_err("file source");
        assert!(matches!(err, SyncTreeError::SourceNotDirectory(_)));
    }

    #[test]
    fn reconcile_rejects_invalid_pattern_before_creating_destination() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");
        let dst = tmp.path().join("dst");

        let spec_sync_options = SpecSyncOptions {
            patterns_ignore: Some(vec!["[".to_string()]),
            ..options_serial()
        };
        let err = reconcile(&src, &dst, spec_sync_options).expect_err("invalid glob");
        assert!(matches!(err, SyncTreeError::InvalidPattern(_)));
        assert!(!dst.exists());
    }

    #[test]
    fn reconcile_dry_run_leaves_destination_untouched() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "a");
        write_text(&src.join("sub/b.txt"), "b");

        let sink = SinkCollect::new();
        let spec_sync_options = SpecSyncOptions {
            if_dry_run: true,
            ..SpecSyncOptions::default()
        };
        let report = reconcile_with_sink(&src, &dst, spec_sync_options, &sink).expect("dry run");
        assert!(!dst.exists());
        assert!(report.if_dry_run);
        assert_eq!(report.cnt_created, 2);
        assert!(sink.outcomes().iter().all(|v| v.if_dry_run));
        assert_eq!(sink.summaries().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn reconcile_reports_source_symlink_loop_without_recursing_forever() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("sub/f.txt"), "f");
        symlink(&src, src.join("sub/back")).expect("symlink");

        let report = reconcile(&src, &dst, options_serial()).expect("reconcile");
        assert!(report.has_failures());
        assert!(report.errors.iter().all(|e| e.kind == EnumSyncErrorKind::Copy));
        assert_eq!(fs::read_to_string(dst.join("sub/f.txt")).expect("read"), "f");
    }

    #[test]
    fn vanished_source_level_is_recorded_and_skipped() {
        let tmp = TempDir::new().expect("tempdir");
        let dst = tmp.path().join("dst");
        write_text(&tmp.path().join("plain.txt"), "x");

        let sink = SinkCollect::new();
        let spec_sync_ctx = ctx_collect(&sink);
        reconcile_dir(
            &spec_sync_ctx,
            &SpecDirPair::new(tmp.path().join("gone"), dst.join("gone")),
            &[],
        );
        reconcile_dir(
            &spec_sync_ctx,
            &SpecDirPair::new(tmp.path().join("plain.txt"), dst.join("plain")),
            &[],
        );

        let l_outcomes = sink.outcomes();
        assert_eq!(l_outcomes.len(), 2);
        for spec_outcome in &l_outcomes {
            assert_eq!(spec_outcome.action.kind, EnumSyncActionKind::Recurse);
            let failure = spec_outcome.failure().expect("failed outcome");
            assert_eq!(failure.kind, EnumSyncErrorKind::SourceMissing);
        }
        assert!(!dst.exists());
    }
}
