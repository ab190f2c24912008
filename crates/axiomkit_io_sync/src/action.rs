//! Action model, pure planning and side-effecting appliers.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use crate::classify::SpecClassification;
use crate::spec::{EnumSyncActionKind, EnumSyncErrorKind, SpecDirPair, SpecSyncFailure};
use crate::util::{
    SpecSyncPatterns, TypeDirIdentity, copy_file_with_metadata, copy_subtree, remove_entry,
};

/// One unit of work derived from a directory pair.
///
/// `name` is empty for actions that target the pair's destination directory
/// itself (`CreateDestination`, `Recurse`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSyncAction {
    pub kind: EnumSyncActionKind,
    pub spec_pair: SpecDirPair,
    pub name: OsString,
    pub if_is_dir: bool,
}

impl SpecSyncAction {
    pub fn new(
        kind: EnumSyncActionKind,
        spec_pair: &SpecDirPair,
        name: &OsString,
        if_is_dir: bool,
    ) -> Self {
        Self {
            kind,
            spec_pair: spec_pair.clone(),
            name: name.clone(),
            if_is_dir,
        }
    }

    /// Action against the pair's own directories.
    pub fn for_pair(kind: EnumSyncActionKind, spec_pair: &SpecDirPair) -> Self {
        Self {
            kind,
            spec_pair: spec_pair.clone(),
            name: OsString::new(),
            if_is_dir: true,
        }
    }

    pub fn path_src(&self) -> PathBuf {
        if self.name.is_empty() {
            return self.spec_pair.path_dir_src.clone();
        }
        self.spec_pair.path_dir_src.join(&self.name)
    }

    pub fn path_dst(&self) -> PathBuf {
        if self.name.is_empty() {
            return self.spec_pair.path_dir_dst.clone();
        }
        self.spec_pair.path_dir_dst.join(&self.name)
    }
}

/// Everything one level has to do: leaf actions plus the pairs to descend into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecSyncPlan {
    pub actions: Vec<SpecSyncAction>,
    pub descend: Vec<SpecDirPair>,
}

impl SpecSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.descend.is_empty()
    }
}

/// Turn one classification into a plan. No filesystem access.
///
/// Leaf actions target pairwise distinct destination paths, so they can run in
/// any order or concurrently.
pub fn plan_actions(spec_pair: &SpecDirPair, spec_cls: &SpecClassification) -> SpecSyncPlan {
    let is_dir_src = |name: &OsString| spec_cls.kinds_src.get(name).is_some_and(|k| k.is_dir());
    let is_dir_dst = |name: &OsString| spec_cls.kinds_dst.get(name).is_some_and(|k| k.is_dir());

    let mut l_actions = Vec::with_capacity(
        spec_cls.create_only.len()
            + spec_cls.differing.len()
            + spec_cls.mismatched.len()
            + spec_cls.remove_only.len(),
    );
    for name in &spec_cls.create_only {
        l_actions.push(SpecSyncAction::new(
            EnumSyncActionKind::Create,
            spec_pair,
            name,
            is_dir_src(name),
        ));
    }
    for name in &spec_cls.differing {
        l_actions.push(SpecSyncAction::new(
            EnumSyncActionKind::Update,
            spec_pair,
            name,
            false,
        ));
    }
    for name in &spec_cls.mismatched {
        l_actions.push(SpecSyncAction::new(
            EnumSyncActionKind::Replace,
            spec_pair,
            name,
            is_dir_src(name),
        ));
    }
    for name in &spec_cls.remove_only {
        l_actions.push(SpecSyncAction::new(
            EnumSyncActionKind::Delete,
            spec_pair,
            name,
            is_dir_dst(name),
        ));
    }

    SpecSyncPlan {
        actions: l_actions,
        descend: spec_cls
            .common_dirs
            .iter()
            .map(|name| spec_pair.join(name))
            .collect(),
    }
}

/// Knobs an applier needs from the running reconcile.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpecApplyContext<'a> {
    pub(crate) spec_pats: &'a SpecSyncPatterns,
    pub(crate) if_preserve_metadata: bool,
    pub(crate) if_parallel: bool,
    pub(crate) l_ancestors: &'a [TypeDirIdentity],
}

/// Result of applying one leaf action.
#[derive(Debug)]
pub(crate) struct SpecApplyResult {
    pub(crate) result: Result<(), SpecSyncFailure>,
    pub(crate) warnings: Vec<String>,
}

impl SpecApplyResult {
    fn ok(warnings: Vec<String>) -> Self {
        Self {
            result: Ok(()),
            warnings,
        }
    }

    fn from_io(kind: EnumSyncErrorKind, e: io::Error) -> Self {
        Self::failed(kind, e.to_string(), Vec::new())
    }

    fn failed(kind: EnumSyncErrorKind, message: String, warnings: Vec<String>) -> Self {
        Self {
            result: Err(SpecSyncFailure::new(kind, message)),
            warnings,
        }
    }
}

pub(crate) fn apply_action(
    spec_action: &SpecSyncAction,
    spec_apply_ctx: SpecApplyContext<'_>,
) -> SpecApplyResult {
    match spec_action.kind {
        EnumSyncActionKind::Create => _apply_create(spec_action, spec_apply_ctx),
        EnumSyncActionKind::Update => {
            match copy_file_with_metadata(
                &spec_action.path_src(),
                &spec_action.path_dst(),
                spec_apply_ctx.if_preserve_metadata,
            ) {
                Ok(_) => SpecApplyResult::ok(Vec::new()),
                Err(e) => SpecApplyResult::from_io(EnumSyncErrorKind::Copy, e),
            }
        }
        EnumSyncActionKind::Delete => match remove_entry(&spec_action.path_dst()) {
            Ok(_) => SpecApplyResult::ok(Vec::new()),
            Err(e) => SpecApplyResult::from_io(EnumSyncErrorKind::Delete, e),
        },
        EnumSyncActionKind::Replace => {
            if let Err(e) = remove_entry(&spec_action.path_dst()) {
                return SpecApplyResult::from_io(EnumSyncErrorKind::Delete, e);
            }
            _apply_create(spec_action, spec_apply_ctx)
        }
        EnumSyncActionKind::CreateDestination | EnumSyncActionKind::Recurse => {
            SpecApplyResult::failed(
                EnumSyncErrorKind::Copy,
                format!("{:?} is not a leaf action", spec_action.kind),
                Vec::new(),
            )
        }
    }
}

fn _apply_create(
    spec_action: &SpecSyncAction,
    spec_apply_ctx: SpecApplyContext<'_>,
) -> SpecApplyResult {
    let path_src = spec_action.path_src();
    let path_dst = spec_action.path_dst();
    if !spec_action.if_is_dir {
        return match copy_file_with_metadata(
            &path_src,
            &path_dst,
            spec_apply_ctx.if_preserve_metadata,
        ) {
            Ok(_) => SpecApplyResult::ok(Vec::new()),
            Err(e) => SpecApplyResult::from_io(EnumSyncErrorKind::Copy, e),
        };
    }

    let spec_subtree = copy_subtree(
        &path_src,
        &path_dst,
        spec_apply_ctx.spec_pats,
        spec_apply_ctx.if_preserve_metadata,
        spec_apply_ctx.if_parallel,
        spec_apply_ctx.l_ancestors,
    );
    if spec_subtree.errors.is_empty() {
        return SpecApplyResult::ok(spec_subtree.warnings);
    }
    let message = if spec_subtree.errors.len() == 1 {
        spec_subtree.errors.join("")
    } else {
        format!(
            "{} entries failed: {}",
            spec_subtree.errors.len(),
            spec_subtree.errors.join("; ")
        )
    };
    SpecApplyResult::failed(EnumSyncErrorKind::Copy, message, spec_subtree.warnings)
}
