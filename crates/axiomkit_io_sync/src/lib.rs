//! `axiomkit_io_sync` v1:
//! Rust-side directory mirror engine.
//!
//! One level at a time, the engine classifies the children of a
//! (source, destination) directory pair, plans the leaf actions that make the
//! destination match, and runs them together with the descents into common
//! subdirectories on a bounded rayon pool.
//!
//! Modules:
//! - `spec`      : enums/options/errors
//! - `classify`  : directory listing, ignore filtering, file comparison, partition
//! - `action`    : action model, pure planning, appliers
//! - `reconcile` : walk and task-group dispatch
//! - `report`    : run-time report model
//! - `sink`      : injected outcome sinks
//! - `util`      : shared helper functions

pub mod action;
pub mod classify;
pub mod reconcile;
pub mod report;
pub mod sink;
pub mod spec;
mod util;

pub use action::{SpecSyncAction, SpecSyncPlan, plan_actions};
pub use classify::{
    SpecClassification, SyncClassifier, TypeEntryListing, compare_files, partition_entries,
};
pub use reconcile::{reconcile, reconcile_with_sink};
pub use report::{ReportSync, ReportSyncBuilder, SpecSyncOutcome};
pub use sink::{SinkCollect, SinkTracing, SyncSink, format_outcome};
pub use spec::{
    DEFAULT_IGNORE_NAMES, EnumSyncActionKind, EnumSyncCompareMode, EnumSyncEntryKind,
    EnumSyncErrorKind, EnumSyncPatternMode, SpecDirPair, SpecSyncError, SpecSyncFailure,
    SpecSyncOptions, SyncTreeError,
};
