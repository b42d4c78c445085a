// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Scratch checkout lifecycle.
//!
//! A __scratch checkout__ is a disposable Git working copy of an upstream
//! tree at a pinned reference. It is always in one of three states: absent,
//! clean, or dirty. Dirty covers both a freshly patched tree and a tree that
//! received a mirror of the live tree.
//!
//! Materializing never clobbers a dirty scratch checkout. A dirty tree may
//! hold conflict resolution that a human is mid-way through, so the only way
//! forward is to commit it, or to discard it explicitly.

use crate::{
    config::SparsePath,
    part::remote_url,
    sync::sparse::{SparseCheckoutFile, SparseError},
    vcs::{Vcs, VcsError},
};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Remote name every scratch checkout fetches from.
const REMOTE: &str = "origin";

/// Everything needed to check out one reference of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutTarget {
    /// Name of the part or checkout, used in progress output.
    pub name: String,

    /// Remote locator, either `owner/name` on GitHub or a full URL.
    pub repository: String,

    /// Commit, tag, or branch to check out.
    pub reference: String,

    /// Location of the working copy.
    pub path: PathBuf,

    /// Optional path prefixes to restrict the working copy to.
    pub sparse: Vec<SparsePath>,

    /// Fetch only the target reference at depth one.
    pub shallow: bool,
}

/// Observable state of a scratch checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchState {
    /// Nothing exists at the scratch path.
    Absent,

    /// Repository exists without uncommitted changes.
    Clean,

    /// Repository exists with uncommitted changes.
    Dirty,
}

/// Manage scratch checkouts through a [`Vcs`] gateway.
#[derive(Debug)]
pub struct ScratchCheckout<'vcs, V>
where
    V: Vcs,
{
    vcs: &'vcs V,
    show_progress: bool,
}

impl<'vcs, V> ScratchCheckout<'vcs, V>
where
    V: Vcs,
{
    /// Construct new scratch checkout manager.
    pub fn new(vcs: &'vcs V) -> Self {
        Self {
            vcs,
            show_progress: false,
        }
    }

    /// Show a spinner while fetching.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Determine state of scratch checkout at target path.
    ///
    /// An empty directory counts as absent.
    ///
    /// # Errors
    ///
    /// - Return [`ScratchError::NotARepository`] if path holds something other
    ///   than a Git working copy.
    /// - Return [`ScratchError::Vcs`] if status cannot be queried.
    pub fn inspect(&self, path: &Path) -> Result<ScratchState> {
        if !path.exists() || is_empty_dir(path)? {
            return Ok(ScratchState::Absent);
        }

        // INVARIANT: Never fall through to an enclosing repository.
        if !path.join(".git").exists() {
            return Err(ScratchError::NotARepository { path: path.into() });
        }

        if self.vcs.status(path)?.trim().is_empty() {
            Ok(ScratchState::Clean)
        } else {
            Ok(ScratchState::Dirty)
        }
    }

    /// Populate scratch checkout with target reference.
    ///
    /// Initializes a new repository if nothing exists yet, or reuses a clean
    /// one. Sparse rules are written before anything is fetched, so only the
    /// tracked paths ever reach the work tree.
    ///
    /// # Errors
    ///
    /// - Return [`ScratchError::DirtyWorktree`] if an existing checkout has
    ///   uncommitted changes.
    /// - Return [`ScratchError::Vcs`] if any Git step fails.
    /// - Return [`ScratchError::Sparse`] if sparse rules cannot be written.
    #[instrument(skip(self, target), fields(name = %target.name), level = "debug")]
    pub fn materialize(&self, target: &CheckoutTarget) -> Result<()> {
        let path = target.path.as_path();
        let url = remote_url(&target.repository);

        let reused = match self.inspect(path)? {
            ScratchState::Dirty => {
                return Err(ScratchError::DirtyWorktree { path: path.into() });
            }
            ScratchState::Clean => {
                debug!("reuse clean checkout at {:?}", path.display());
                self.vcs.set_config(path, "remote.origin.url", &url)?;
                true
            }
            ScratchState::Absent => {
                info!("initialize checkout of {url} at {:?}", path.display());
                fs::create_dir_all(path).map_err(|err| ScratchError::Io {
                    source: err,
                    path: path.into(),
                })?;
                self.vcs.init(path)?;
                self.vcs.add_remote(path, REMOTE, &url)?;
                false
            }
        };

        self.vcs.set_config(path, "advice.detachedHead", "false")?;
        self.vcs.set_config(path, "core.autocrlf", "false")?;
        if !target.sparse.is_empty() {
            self.vcs.set_config(path, "core.sparseCheckout", "true")?;
            SparseCheckoutFile::new(path.join(".git"))?
                .replace(target.sparse.iter().map(SparsePath::as_rule))?;
        }

        self.fetch(target)?;
        if target.shallow {
            self.vcs.checkout(path, "FETCH_HEAD")?;
        } else {
            let revision = self.resolve_fetched(path, &target.reference)?;
            self.vcs.checkout(path, &revision)?;
        }

        if reused && !target.sparse.is_empty() {
            self.vcs.reapply_sparsity(path)?;
        }

        info!("checked out {} at {:?}", target.reference, path.display());
        Ok(())
    }

    /// Remove scratch checkout entirely.
    ///
    /// Does nothing if the checkout is already gone. Read-only files, e.g.,
    /// Git's packed objects on Windows, are made writable and removal is tried
    /// once more.
    ///
    /// # Errors
    ///
    /// - Return [`ScratchError::Io`] if removal fails.
    #[instrument(skip(self), level = "debug")]
    pub fn destroy(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!("nothing to remove at {:?}", path.display());
            return Ok(());
        }

        let io_err = |err| ScratchError::Io {
            source: err,
            path: path.into(),
        };

        match fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                warn!("retry removal of {:?} after clearing read-only flags", path.display());
                make_writable(path);
                fs::remove_dir_all(path).map_err(io_err)?;
            }
            Err(err) => return Err(io_err(err)),
        }

        info!("removed {:?}", path.display());
        Ok(())
    }

    fn fetch(&self, target: &CheckoutTarget) -> Result<()> {
        let bar = if self.show_progress {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template(
                "{spinner:.green} {elapsed_precise:.green}  {msg}",
            )?);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("fetch {} at {}", target.name, target.reference));

        let result = if target.shallow {
            self.vcs
                .fetch(&target.path, REMOTE, Some(&target.reference), Some(1))
        } else {
            self.vcs.fetch(&target.path, REMOTE, None, None)
        };
        bar.finish_and_clear();

        Ok(result?)
    }

    // INVARIANT: Branches resolve to their freshly fetched remote tip.
    fn resolve_fetched(&self, path: &Path, reference: &str) -> Result<String> {
        match self.vcs.rev_parse(path, &format!("{REMOTE}/{reference}")) {
            Ok(oid) => Ok(oid),
            Err(_) => Ok(self.vcs.rev_parse(path, reference)?),
        }
    }
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }

    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .map_err(|err| ScratchError::Io {
            source: err,
            path: path.into(),
        })
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path) {
    for entry in WalkDir::new(path).into_iter().filter_map(|entry| entry.ok()) {
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                permissions.set_readonly(false);
                if let Err(err) = fs::set_permissions(entry.path(), permissions) {
                    debug!("failed to make {:?} writable: {err}", entry.path().display());
                }
            }
        }
    }
}

/// Scratch checkout error types.
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    /// Scratch checkout holds uncommitted changes.
    #[error(
        "scratch checkout at {:?} has uncommitted changes, commit or discard them first",
        path.display()
    )]
    DirtyWorktree { path: PathBuf },

    /// Scratch path holds something other than a Git working copy.
    #[error("{:?} exists but is not a git working copy", path.display())]
    NotARepository { path: PathBuf },

    /// Filesystem operation on scratch path fails.
    #[error("failed to access scratch checkout at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Git operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Sparse checkout rules cannot be written.
    #[error(transparent)]
    Sparse(#[from] SparseError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = ScratchError> = std::result::Result<T, E>;
