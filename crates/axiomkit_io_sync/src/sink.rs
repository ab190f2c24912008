//! Outcome sinks.
//!
//! The reconciler never logs per-action records on its own; everything goes
//! through the [`SyncSink`] passed in by the caller. Hooks are called from
//! worker threads, so implementations must serialize their own writes.

use std::sync::{Mutex, PoisonError};

use crate::report::{ReportSync, SpecSyncOutcome};
use crate::spec::{EnumSyncActionKind, SpecDirPair};

pub trait SyncSink: Send + Sync {
    /// Once, before the root pair is touched.
    fn on_start(&self, spec_pair: &SpecDirPair);

    /// Once per attempted (or, in a dry run, planned) action.
    fn on_outcome(&self, spec_outcome: &SpecSyncOutcome);

    /// Non-fatal diagnostics: skipped special files, compare fallbacks.
    fn on_warning(&self, message: &str);

    /// Once, after every task group has completed.
    fn on_finish(&self, report: &ReportSync);
}

/// Render one outcome as a single log line.
pub fn format_outcome(spec_outcome: &SpecSyncOutcome) -> String {
    let spec_action = &spec_outcome.action;
    let path_src = spec_action.path_src();
    let path_dst = spec_action.path_dst();
    let c_dst = path_dst.display();
    let c_kind_entry = if spec_action.if_is_dir {
        "Directory"
    } else {
        "File"
    };

    let message = match (&spec_outcome.result, spec_action.kind) {
        (Ok(_), EnumSyncActionKind::Create) if spec_action.if_is_dir => {
            format!("Directory created: {c_dst}")
        }
        (Ok(_), EnumSyncActionKind::Create) => format!("File copied: {c_dst}"),
        (Ok(_), EnumSyncActionKind::Update) => format!("File updated: {c_dst}"),
        (Ok(_), EnumSyncActionKind::Delete) => format!("{c_kind_entry} removed: {c_dst}"),
        (Ok(_), EnumSyncActionKind::Replace) => format!("{c_kind_entry} replaced: {c_dst}"),
        (Ok(_), EnumSyncActionKind::CreateDestination) => {
            format!("Created destination directory '{c_dst}'.")
        }
        (Ok(_), EnumSyncActionKind::Recurse) => format!("Directory synchronized: {c_dst}"),
        (Err(failure), EnumSyncActionKind::Create) => format!(
            "Failed to copy '{}' to '{c_dst}': {}",
            path_src.display(),
            failure.message
        ),
        (Err(failure), EnumSyncActionKind::Update) => {
            format!("Failed to update '{c_dst}': {}", failure.message)
        }
        (Err(failure), EnumSyncActionKind::Delete) => {
            format!("Failed to remove '{c_dst}': {}", failure.message)
        }
        (Err(failure), EnumSyncActionKind::Replace) => {
            format!("Failed to replace '{c_dst}': {}", failure.message)
        }
        (Err(failure), EnumSyncActionKind::CreateDestination) => format!(
            "Failed to create destination directory '{c_dst}': {}",
            failure.message
        ),
        (Err(failure), EnumSyncActionKind::Recurse) => format!(
            "Skipped '{}' ({}): {}",
            path_src.display(),
            failure.kind,
            failure.message
        ),
    };

    if spec_outcome.if_dry_run {
        return format!("[DRY-RUN] {message}");
    }
    message
}

/// Forwards every hook to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinkTracing;

impl SyncSink for SinkTracing {
    fn on_start(&self, spec_pair: &SpecDirPair) {
        tracing::info!("Synchronization started.");
        tracing::debug!(
            "source={} destination={}",
            spec_pair.path_dir_src.display(),
            spec_pair.path_dir_dst.display()
        );
    }

    fn on_outcome(&self, spec_outcome: &SpecSyncOutcome) {
        let message = format_outcome(spec_outcome);
        if spec_outcome.is_success() {
            tracing::info!("{message}");
        } else {
            tracing::error!("{message}");
        }
    }

    fn on_warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn on_finish(&self, report: &ReportSync) {
        tracing::info!("Synchronization completed in {:?}.", report.duration);
        tracing::debug!("{report}");
    }
}

/// Keeps everything in memory, in arrival order.
#[derive(Debug, Default)]
pub struct SinkCollect {
    outcomes: Mutex<Vec<SpecSyncOutcome>>,
    warnings: Mutex<Vec<String>>,
    summaries: Mutex<Vec<String>>,
}

impl SinkCollect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<SpecSyncOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One formatted report per finished run.
    pub fn summaries(&self) -> Vec<String> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SyncSink for SinkCollect {
    fn on_start(&self, _spec_pair: &SpecDirPair) {}

    fn on_outcome(&self, spec_outcome: &SpecSyncOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec_outcome.clone());
    }

    fn on_warning(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }

    fn on_finish(&self, report: &ReportSync) {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::sync::Arc;
    use std::thread;

    use super::{SinkCollect, SyncSink, format_outcome};
    use crate::action::SpecSyncAction;
    use crate::report::{ReportSync, SpecSyncOutcome};
    use crate::spec::{EnumSyncActionKind, EnumSyncErrorKind, SpecDirPair, SpecSyncFailure};

    fn outcome(
        kind: EnumSyncActionKind,
        if_is_dir: bool,
        result: Result<(), SpecSyncFailure>,
    ) -> SpecSyncOutcome {
        SpecSyncOutcome {
            action: SpecSyncAction::new(
                kind,
                &SpecDirPair::new("/src", "/dst"),
                &OsString::from("x"),
                if_is_dir,
            ),
            result,
            if_dry_run: false,
        }
    }

    #[test]
    fn outcome_messages_follow_log_wording() {
        assert_eq!(
            format_outcome(&outcome(EnumSyncActionKind::Create, true, Ok(()))),
            "Directory created: /dst/x"
        );
        assert_eq!(
            format_outcome(&outcome(EnumSyncActionKind::Create, false, Ok(()))),
            "File copied: /dst/x"
        );
        assert_eq!(
            format_outcome(&outcome(EnumSyncActionKind::Delete, true, Ok(()))),
            "Directory removed: /dst/x"
        );
        assert_eq!(
            format_outcome(&outcome(
                EnumSyncActionKind::Create,
                false,
                Err(SpecSyncFailure::new(EnumSyncErrorKind::Copy, "denied")),
            )),
            "Failed to copy '/src/x' to '/dst/x': denied"
        );
        assert_eq!(
            format_outcome(&outcome(
                EnumSyncActionKind::Delete,
                false,
                Err(SpecSyncFailure::new(EnumSyncErrorKind::Delete, "busy")),
            )),
            "Failed to remove '/dst/x': busy"
        );

        let spec_outcome = SpecSyncOutcome {
            action: SpecSyncAction::for_pair(
                EnumSyncActionKind::CreateDestination,
                &SpecDirPair::new("/src", "/dst"),
            ),
            result: Ok(()),
            if_dry_run: true,
        };
        assert_eq!(
            format_outcome(&spec_outcome),
            "[DRY-RUN] Created destination directory '/dst'."
        );
    }

    #[test]
    fn collect_sink_accepts_concurrent_appends() {
        let sink = Arc::new(SinkCollect::new());
        let l_handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sink.on_outcome(&outcome(EnumSyncActionKind::Update, false, Ok(())));
                        sink.on_warning("w");
                    }
                })
            })
            .collect();
        for handle in l_handles {
            handle.join().expect("join");
        }
        sink.on_finish(&ReportSync::default());

        assert_eq!(sink.outcomes().len(), 400);
        assert_eq!(sink.warnings().len(), 400);
        assert_eq!(sink.summaries().len(), 1);
    }
}
