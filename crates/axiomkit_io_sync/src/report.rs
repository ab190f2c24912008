//! Sync outcome/report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::action::SpecSyncAction;
use crate::spec::{EnumSyncActionKind, SpecSyncError, SpecSyncFailure};

/// Recorded result of one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncOutcome {
    pub action: SpecSyncAction,
    pub result: Result<(), SpecSyncFailure>,
    /// Planned only; nothing was changed on disk.
    pub if_dry_run: bool,
}

impl SpecSyncOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<&SpecSyncFailure> {
        self.result.as_ref().err()
    }

    /// Path the failure is attributed to: source for copies, destination otherwise.
    pub fn path_subject(&self) -> PathBuf {
        match self.action.kind {
            EnumSyncActionKind::Create | EnumSyncActionKind::Recurse => self.action.path_src(),
            _ => self.action.path_dst(),
        }
    }
}

/// Aggregate counters and diagnostics for one `reconcile` run.
#[derive(Debug, Default, Clone)]
pub struct ReportSync {
    /// Source-only entries copied into the destination.
    pub cnt_created: u64,
    /// Differing files overwritten.
    pub cnt_updated: u64,
    /// Destination-only entries removed.
    pub cnt_deleted: u64,
    /// Entries whose kind differed and were replaced.
    pub cnt_replaced: u64,
    /// Files already equal.
    pub cnt_identical: u64,
    /// Directory pairs classified, the root included.
    pub cnt_recursed: u64,
    /// Source entries skipped as neither file nor directory.
    pub cnt_unsupported: u64,
    /// Non-fatal warnings collected during the run.
    pub warnings: Vec<String>,
    /// Per-entry failures.
    pub errors: Vec<SpecSyncError>,
    /// Every outcome in completion order.
    pub outcomes: Vec<SpecSyncOutcome>,
    /// Wall time of the whole run.
    pub duration: Duration,
    pub if_dry_run: bool,
}

impl ReportSync {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Distinguishes "run had failures" from "run succeeded fully".
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of leaf actions performed (or planned, in a dry run).
    pub fn action_count(&self) -> u64 {
        self.cnt_created + self.cnt_updated + self.cnt_deleted + self.cnt_replaced
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_created".to_string(), self.cnt_created);
        dict_counts.insert("cnt_updated".to_string(), self.cnt_updated);
        dict_counts.insert("cnt_deleted".to_string(), self.cnt_deleted);
        dict_counts.insert("cnt_replaced".to_string(), self.cnt_replaced);
        dict_counts.insert("cnt_identical".to_string(), self.cnt_identical);
        dict_counts.insert("cnt_recursed".to_string(), self.cnt_recursed);
        dict_counts.insert("cnt_unsupported".to_string(), self.cnt_unsupported);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} created={} updated={} deleted={} replaced={} identical={} recursed={} errors={} warnings={}",
            dict_counts["cnt_created"],
            dict_counts["cnt_updated"],
            dict_counts["cnt_deleted"],
            dict_counts["cnt_replaced"],
            dict_counts["cnt_identical"],
            dict_counts["cnt_recursed"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[SYNC]"))
    }
}

/// Mutable accumulator for sync statistics.
///
/// Shared across workers behind a `Mutex` by the reconciler.
#[derive(Debug, Default, Clone)]
pub struct ReportSyncBuilder {
    pub cnt_created: u64,
    pub cnt_updated: u64,
    pub cnt_deleted: u64,
    pub cnt_replaced: u64,
    pub cnt_identical: u64,
    pub cnt_recursed: u64,
    pub cnt_unsupported: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<SpecSyncError>,
    pub outcomes: Vec<SpecSyncOutcome>,
}

impl ReportSyncBuilder {
    /// Record one outcome, bumping the matching counter on success.
    pub fn add_outcome(&mut self, spec_outcome: SpecSyncOutcome) {
        match &spec_outcome.result {
            Ok(_) => match spec_outcome.action.kind {
                EnumSyncActionKind::Create => self.cnt_created += 1,
                EnumSyncActionKind::Update => self.cnt_updated += 1,
                EnumSyncActionKind::Delete => self.cnt_deleted += 1,
                EnumSyncActionKind::Replace => self.cnt_replaced += 1,
                EnumSyncActionKind::CreateDestination | EnumSyncActionKind::Recurse => {}
            },
            Err(failure) => self.errors.push(SpecSyncError {
                path: spec_outcome.path_subject(),
                kind: failure.kind,
                exception: failure.message.clone(),
            }),
        }
        self.outcomes.push(spec_outcome);
    }

    pub fn add_identical(&mut self, value: u64) {
        self.cnt_identical += value;
    }

    pub fn add_recursed(&mut self) {
        self.cnt_recursed += 1;
    }

    pub fn add_unsupported(&mut self, value: u64) {
        self.cnt_unsupported += value;
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self, duration: Duration, if_dry_run: bool) -> ReportSync {
        ReportSync {
            cnt_created: self.cnt_created,
            cnt_updated: self.cnt_updated,
            cnt_deleted: self.cnt_deleted,
            cnt_replaced: self.cnt_replaced,
            cnt_identical: self.cnt_identical,
            cnt_recursed: self.cnt_recursed,
            cnt_unsupported: self.cnt_unsupported,
            warnings: self.warnings,
            errors: self.errors,
            outcomes: self.outcomes,
            duration,
            if_dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{ReportSync, ReportSyncBuilder, SpecSyncOutcome};
    use crate::action::SpecSyncAction;
    use crate::spec::{EnumSyncActionKind, EnumSyncErrorKind, SpecDirPair, SpecSyncFailure};

    fn outcome(kind: EnumSyncActionKind, result: Result<(), SpecSyncFailure>) -> SpecSyncOutcome {
        SpecSyncOutcome {
            action: SpecSyncAction::new(
                kind,
                &SpecDirPair::new("/src", "/dst"),
                &OsString::from("x.txt"),
                false,
            ),
            result,
            if_dry_run: false,
        }
    }

    #[test]
    fn report_sync_to_dict_and_format() {
        let report = ReportSync {
            cnt_created: 3,
            cnt_updated: 1,
            cnt_deleted: 2,
            cnt_identical: 7,
            cnt_recursed: 4,
            warnings: vec!["w".to_string()],
            ..ReportSync::default()
        };

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_created"], 3);
        assert_eq!(dict_counts["cnt_errors"], 0);
        assert_eq!(dict_counts["cnt_warnings"], 1);
        assert_eq!(report.action_count(), 6);

        let txt = report.format("[SYNC]");
        assert_eq!(
            txt,
            "[SYNC] created=3 updated=1 deleted=2 replaced=0 identical=7 recursed=4 errors=0 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
    }

    #[test]
    fn builder_counts_successes_and_records_failures() {
        let mut builder = ReportSyncBuilder::default();
        builder.add_outcome(outcome(EnumSyncActionKind::Create, Ok(())));
        builder.add_outcome(outcome(EnumSyncActionKind::Delete, Ok(())));
        builder.add_outcome(outcome(
            EnumSyncActionKind::Update,
            Err(SpecSyncFailure::new(EnumSyncErrorKind::Copy, "disk full")),
        ));
        builder.add_outcome(outcome(
            EnumSyncActionKind::Create,
            Err(SpecSyncFailure::new(EnumSyncErrorKind::Copy, "denied")),
        ));

        let report = builder.build(Duration::from_millis(5), false);
        assert_eq!(report.cnt_created, 1);
        assert_eq!(report.cnt_deleted, 1);
        assert_eq!(report.cnt_updated, 0);
        assert!(report.has_failures());
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.errors[0].path, PathBuf::from("/dst/x.txt"));
        assert_eq!(report.errors[1].path, PathBuf::from("/src/x.txt"));
        assert_eq!(report.errors[0].exception, "disk full");
    }
}
