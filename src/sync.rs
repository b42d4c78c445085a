// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch synchronization workflows.
//!
//! Three workflows keep a part's live tree, its patch file, and its pinned
//! upstream commit consistent with each other:
//!
//! - __update__: rebuild the live tree as pinned upstream plus patch.
//! - __repatch__: regenerate the patch from a resolved scratch checkout, or
//!   from the live tree if no resolution exists.
//! - __repack__: regenerate the patch from the live tree while keeping the
//!   scratch checkout around for further work.
//!
//! Every workflow runs strictly sequentially, and every workflow is safe to
//! re-run after a failure. A failure never deletes the scratch checkout, so a
//! half-finished conflict resolution is never lost. The only mutation of the
//! live tree happens through [`TreeMirror`] at the very end of an update.

pub mod mirror;
pub mod patch;
pub mod scratch;
pub mod sparse;

use crate::{
    config::SparsePath,
    part::TrackedPart,
    sync::{
        mirror::{MirrorError, TreeMirror},
        patch::{PatchDocument, PatchError, PatchStore},
        scratch::{CheckoutTarget, ScratchCheckout, ScratchError, ScratchState},
        sparse::{SparseError, SparseMatcher},
    },
    vcs::{ApplyOutcome, DiffRange, GitCli, Vcs, VcsError},
};

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Commit message of the synthetic commit holding the live tree.
const LOCAL_CHANGES_MESSAGE: &str = "forkpatch: local changes";

/// Terminal state of a successful workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Live tree now equals pinned upstream plus patch.
    Synced,

    /// Patch regenerated and scratch checkout removed.
    Repatched,

    /// Patch regenerated and scratch checkout kept at pinned commit.
    Repacked,

    /// Nothing diverges from pinned upstream, patch file left untouched.
    NoChanges,
}

/// Run patch synchronization workflows over a [`Vcs`] gateway.
#[derive(Debug, Default)]
pub struct SyncEngine<V = GitCli>
where
    V: Vcs,
{
    vcs: V,
    show_progress: bool,
}

impl<V> SyncEngine<V>
where
    V: Vcs,
{
    /// Construct new sync engine.
    pub fn new(vcs: V) -> Self {
        Self {
            vcs,
            show_progress: false,
        }
    }

    /// Show a spinner while fetching upstream.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Rebuild live tree from pinned upstream plus patch.
    ///
    /// A missing patch file is not an error: the live tree simply becomes the
    /// pristine upstream tree. On success the scratch checkout is removed.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::UnmergedConflict`] if the patch does not apply
    ///   cleanly. The scratch checkout is left in place with conflict markers
    ///   and the live tree is not touched.
    /// - Return [`SyncError::Scratch`] if the scratch checkout holds
    ///   uncommitted changes or cannot be materialized.
    #[instrument(skip(self, part), fields(part = %part.name), level = "debug")]
    pub fn update(&self, part: &TrackedPart) -> Result<Outcome> {
        info!("update {} from {:?}", part.name, part.patch_path.display());
        let patch = match PatchStore::read(&part.patch_path) {
            Ok(patch) => patch,
            Err(PatchError::NotFound { path }) => {
                warn!("no patch at {:?}, installing pristine upstream", path.display());
                PatchDocument::default()
            }
            Err(err) => return Err(err.into()),
        };
        self.warn_untracked_paths(part, &patch)?;

        let scratch = self.scratch();
        scratch.materialize(&part.scratch_target())?;
        if let ApplyOutcome::Conflict(details) =
            PatchStore::try_apply(&self.vcs, &part.scratch_path, &patch)?
        {
            return Err(SyncError::UnmergedConflict {
                part: part.name.clone(),
                scratch: part.scratch_path.clone(),
                details,
            });
        }

        TreeMirror::copy(&part.sparse_paths, &part.scratch_path, &part.local_path)?;
        scratch.destroy(&part.scratch_path)?;

        info!("{} synced at {}", part.name, part.pinned_commit);
        Ok(Outcome::Synced)
    }

    /// Regenerate patch as difference between pinned commit and scratch HEAD.
    ///
    /// If the scratch checkout holds committed conflict resolution, that
    /// resolution becomes the new patch. Otherwise the live tree is committed
    /// on top of the pinned commit first. On success the scratch checkout is
    /// removed.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Scratch`] with [`ScratchError::DirtyWorktree`] if
    ///   the scratch checkout holds uncommitted resolution.
    /// - Return [`SyncError::Patch`] if the patch file cannot be written.
    #[instrument(skip(self, part), fields(part = %part.name), level = "debug")]
    pub fn repatch(&self, part: &TrackedPart) -> Result<Outcome> {
        let scratch = self.scratch();
        let path = part.scratch_path.as_path();

        let needs_baseline = match scratch.inspect(path)? {
            ScratchState::Absent => true,
            ScratchState::Dirty => {
                return Err(ScratchError::DirtyWorktree { path: path.into() }.into());
            }
            ScratchState::Clean => {
                let head = self.vcs.rev_parse(path, "HEAD")?;
                let pinned = self.vcs.rev_parse(path, &part.pinned_commit)?;
                head == pinned
            }
        };

        if needs_baseline {
            info!("no committed resolution, take patch from live tree");
            scratch.materialize(&part.scratch_target())?;
            TreeMirror::copy(&part.sparse_paths, &part.local_path, path)?;
            self.vcs.stage_all(path)?;
            self.vcs.commit(path, LOCAL_CHANGES_MESSAGE)?;
        } else {
            info!("take patch from committed resolution at {:?}", path.display());
        }

        let patch = PatchDocument::from(self.vcs.diff(
            path,
            DiffRange::Commits {
                from: &part.pinned_commit,
                to: "HEAD",
            },
        )?);
        if patch.is_empty() {
            info!("{} does not diverge from {}", part.name, part.pinned_commit);
            scratch.destroy(path)?;
            return Ok(Outcome::NoChanges);
        }

        PatchStore::write(&part.patch_path, &patch)?;
        scratch.destroy(path)?;

        info!("patch written to {:?}", part.patch_path.display());
        Ok(Outcome::Repatched)
    }

    /// Regenerate patch from live tree and keep scratch checkout.
    ///
    /// Every sparse path must exist in the live tree. Afterwards the scratch
    /// checkout sits clean at the pinned commit and can be reused.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::LocalPathMissing`] if a sparse path is missing
    ///   from the live tree. Nothing is touched in that case.
    /// - Return [`SyncError::Scratch`] if the scratch checkout holds
    ///   uncommitted changes or cannot be materialized.
    #[instrument(skip(self, part), fields(part = %part.name), level = "debug")]
    pub fn repack(&self, part: &TrackedPart) -> Result<Outcome> {
        if let Some(path) = part.missing_local_paths().into_iter().next() {
            return Err(SyncError::LocalPathMissing {
                part: part.name.clone(),
                path,
            });
        }

        let scratch = self.scratch();
        let path = part.scratch_path.as_path();
        scratch.materialize(&part.scratch_target())?;
        TreeMirror::copy(&part.sparse_paths, &part.local_path, path)?;

        // INVARIANT: Files new to the live tree must show up in the diff.
        let tracked = part
            .sparse_paths
            .iter()
            .map(|sparse| sparse.relative())
            .collect::<Vec<_>>();
        self.vcs.intent_to_add(path, &tracked)?;

        let patch = PatchDocument::from(self.vcs.diff(path, DiffRange::WorkTree)?);
        if patch.is_empty() {
            self.vcs.restore(path)?;
            info!("{} does not diverge from {}", part.name, part.pinned_commit);
            return Ok(Outcome::NoChanges);
        }

        PatchStore::write(&part.patch_path, &patch)?;
        self.vcs.restore(path)?;

        info!("patch written to {:?}", part.patch_path.display());
        Ok(Outcome::Repacked)
    }

    /// Create data directories and install every pinned checkout.
    ///
    /// Returns the directories that did not exist before.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::CreateDirectory`] if a directory cannot be made.
    /// - Return [`SyncError::Scratch`] if a checkout cannot be materialized.
    #[instrument(skip(self, directories, checkouts), level = "debug")]
    pub fn bootstrap(
        &self,
        directories: &[PathBuf],
        checkouts: &[CheckoutTarget],
    ) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for directory in directories {
            if directory.is_dir() {
                continue;
            }

            create_dir_all(directory).map_err(|err| SyncError::CreateDirectory {
                source: err,
                path: directory.clone(),
            })?;
            info!("created {:?}", directory.display());
            created.push(directory.clone());
        }

        let scratch = self.scratch();
        for checkout in checkouts {
            scratch.materialize(checkout)?;
        }

        Ok(created)
    }

    /// Discard scratch checkout, including any unfinished resolution.
    ///
    /// Returns false if there was nothing to discard.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Scratch`] if removal fails.
    #[instrument(skip(self, part), fields(part = %part.name), level = "debug")]
    pub fn abort(&self, part: &TrackedPart) -> Result<bool> {
        let existed = part.scratch_path.exists();
        self.scratch().destroy(&part.scratch_path)?;
        Ok(existed)
    }

    /// Current state of a part's scratch checkout.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Scratch`] if state cannot be determined.
    pub fn scratch_state(&self, part: &TrackedPart) -> Result<ScratchState> {
        Ok(self.scratch().inspect(&part.scratch_path)?)
    }

    fn scratch(&self) -> ScratchCheckout<'_, V> {
        ScratchCheckout::new(&self.vcs).with_progress(self.show_progress)
    }

    fn warn_untracked_paths(&self, part: &TrackedPart, patch: &PatchDocument) -> Result<()> {
        for path in out_of_scope_paths(&part.sparse_paths, patch)? {
            warn!(
                "patch touches {:?}, which is outside the sparse paths of {}",
                path.display(),
                part.name
            );
        }

        Ok(())
    }
}

/// Paths a patch touches that no sparse path of the part covers.
fn out_of_scope_paths(sparse: &[SparsePath], patch: &PatchDocument) -> Result<Vec<PathBuf>> {
    let matcher = SparseMatcher::new(Path::new(""), sparse.iter().map(SparsePath::as_rule))?;

    // INVARIANT: Absolute header paths never fall under a sparse path, even
    // though the matcher would treat them as repository relative.
    Ok(patch
        .touched_paths()
        .into_iter()
        .filter(|path| path.has_root() || !matcher.matches(path))
        .collect())
}

/// Sync workflow error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Patch does not apply cleanly onto pinned upstream.
    #[error(
        "patch for {part} does not apply cleanly, scratch checkout left at {:?}\n{details}\n\
         resolve the conflicts there, stage and commit the result, then run repatch for {part}",
        scratch.display()
    )]
    UnmergedConflict {
        part: String,
        scratch: PathBuf,
        details: String,
    },

    /// Sparse path has no counterpart in the live tree.
    #[error("{part} tracks {:?}, which does not exist in the live tree", path.display())]
    LocalPathMissing { part: String, path: PathBuf },

    /// Data directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDirectory {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Scratch checkout cannot be used.
    #[error(transparent)]
    Scratch(#[from] ScratchError),

    /// Patch file cannot be read or written.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Live tree and scratch checkout cannot be mirrored.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// Sparse paths cannot be matched.
    #[error(transparent)]
    Sparse(#[from] SparseError),

    /// Git operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
