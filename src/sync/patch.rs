// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch file persistence and application.
//!
//! A part's entire local divergence from its pinned commit lives in one patch
//! file written in Git's unified diff format. The patch is always replaced
//! wholesale. Forkpatch never edits it incrementally, though a human may do so
//! while resolving a conflict.
//!
//! Line terminators are normalized to LF both when a patch is read and when
//! it is written, so the same logical patch is byte-for-byte identical no
//! matter which platform produced it.

use crate::vcs::{ApplyOutcome, Vcs, VcsError};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, read_to_string},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Textual diff between a pinned commit and a scratch tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchDocument(String);

impl PatchDocument {
    /// Construct new patch document from raw diff text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Treat patch as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check if patch carries no divergence at all.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Copy of patch with every CRLF terminator turned into LF.
    pub fn normalized(&self) -> Self {
        Self(self.0.replace("\r\n", "\n"))
    }

    /// Repository relative paths that the patch edits, creates, or removes.
    ///
    /// Only header lines are considered, never hunk content.
    pub fn touched_paths(&self) -> BTreeSet<PathBuf> {
        let mut paths = BTreeSet::new();
        let mut in_header = true;

        for line in self.0.lines() {
            if let Some(rest) = line.strip_prefix("diff --git ") {
                in_header = true;
                paths.extend(diff_git_path(rest).map(PathBuf::from));
            } else if line.starts_with("@@") {
                in_header = false;
            } else if in_header {
                if let Some(path) = line
                    .strip_prefix("--- ")
                    .or_else(|| line.strip_prefix("+++ "))
                    .and_then(file_header_path)
                {
                    paths.insert(path);
                } else if let Some(path) = line
                    .strip_prefix("rename from ")
                    .or_else(|| line.strip_prefix("rename to "))
                {
                    paths.insert(PathBuf::from(unquote(path)));
                }
            }
        }

        paths
    }
}

impl From<String> for PatchDocument {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl Display for PatchDocument {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Read, write, and apply patch files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatchStore;

impl PatchStore {
    /// Read patch file with normalized line terminators.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::NotFound`] if no patch file exists yet. Callers
    ///   decide whether that is fatal or an expected first run.
    /// - Return [`PatchError::Read`] if patch file cannot be read.
    pub fn read(path: &Path) -> Result<PatchDocument> {
        match read_to_string(path) {
            Ok(text) => Ok(PatchDocument(text).normalized()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(PatchError::NotFound {
                path: path.into(),
            }),
            Err(err) => Err(PatchError::Read {
                source: err,
                path: path.into(),
            }),
        }
    }

    /// Write patch file with normalized line terminators.
    ///
    /// Content goes to a temporary file next to the target first, which then
    /// replaces the target in one rename.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Write`] if patch file cannot be written.
    #[instrument(skip(patch), level = "debug")]
    pub fn write(path: &Path, patch: &PatchDocument) -> Result<()> {
        let write_err = |err| PatchError::Write {
            source: err,
            path: path.into(),
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        create_dir_all(parent).map_err(write_err)?;

        let mut file = NamedTempFile::new_in(parent).map_err(write_err)?;
        file.write_all(patch.normalized().as_str().as_bytes())
            .map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(path).map_err(|err| write_err(err.error))?;
        debug!("wrote {} bytes to {:?}", patch.as_str().len(), path.display());

        Ok(())
    }

    /// Try three-way application of patch onto scratch checkout.
    ///
    /// A conflict is an expected, recoverable outcome that needs a human, so
    /// it comes back as [`ApplyOutcome::Conflict`] rather than an error. An
    /// empty patch applies trivially.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Vcs`] if Git cannot be run at all.
    #[instrument(skip(vcs, patch), level = "debug")]
    pub fn try_apply(
        vcs: &impl Vcs,
        scratch: &Path,
        patch: &PatchDocument,
    ) -> Result<ApplyOutcome> {
        if patch.is_empty() {
            debug!("patch is empty, nothing to apply");
            return Ok(ApplyOutcome::Applied);
        }

        let outcome = vcs.apply_three_way(scratch, patch.normalized().as_str())?;
        if outcome == ApplyOutcome::Applied {
            info!("patch applied onto {:?}", scratch.display());
        }

        Ok(outcome)
    }
}

fn diff_git_path(rest: &str) -> Option<&str> {
    let rest = rest.strip_prefix("a/")?;

    // INVARIANT: Prefer the split where both sides name the same path.
    if rest.len() >= 3 && (rest.len() - 3) % 2 == 0 {
        let half = (rest.len() - 3) / 2;
        if let (Some(old), Some(new)) = (rest.get(..half), rest.get(half..)) {
            if new.strip_prefix(" b/") == Some(old) {
                return Some(old);
            }
        }
    }

    rest.rfind(" b/").map(|index| &rest[index + 3..])
}

fn file_header_path(raw: &str) -> Option<PathBuf> {
    let raw = unquote(raw.split('\t').next()?.trim_end());
    if raw == "/dev/null" {
        return None;
    }

    let raw = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(PathBuf::from(raw))
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|raw| raw.strip_suffix('"'))
        .unwrap_or(raw)
}

/// Patch file error types.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// No patch file exists at target path.
    #[error("no patch file at {:?}", path.display())]
    NotFound { path: PathBuf },

    /// Patch file cannot be read.
    #[error("failed to read patch file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Patch file cannot be written.
    #[error("failed to write patch file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Git cannot be run to apply patch.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = PatchError> = std::result::Result<T, E>;
