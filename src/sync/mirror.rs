// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree mirroring between scratch checkout and live tree.
//!
//! Mirroring replaces the destination of every sparse path wholesale: the
//! existing destination is removed first, then the source is deep-copied.
//! Nothing is ever merged into the destination. A copy is all-or-nothing per
//! path, and an interrupted copy leaves only that path in an undefined state.
//! Every caller re-runs from a known-good source on retry.

use crate::config::SparsePath;

use std::{
    fs::{self, File, FileTimes},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Paths touched by a single mirror run, relative to the tree roots.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Paths replaced at the destination.
    pub copied: Vec<PathBuf>,

    /// Paths skipped because the source did not exist.
    pub skipped: Vec<PathBuf>,
}

/// Bidirectional copy of sparse paths between two trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeMirror;

impl TreeMirror {
    /// Mirror each sparse path from one tree root into another.
    ///
    /// Missing sources are skipped with a warning. The part may have shrunk
    /// its tracked set, which also means the skipped path silently drops out of
    /// future patches.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Io`] if removing or copying fails.
    /// - Return [`MirrorError::Walk`] if source directory traversal fails.
    #[instrument(skip(sparse), level = "debug")]
    pub fn copy(sparse: &[SparsePath], from: &Path, to: &Path) -> Result<MirrorReport> {
        let mut report = MirrorReport::default();
        for path in sparse {
            let relative = path.relative();
            let source = from.join(relative);
            let destination = to.join(relative);

            if !source.exists() {
                warn!(
                    "skip {:?}: nothing at {:?}",
                    relative.display(),
                    source.display()
                );
                report.skipped.push(relative.into());
                continue;
            }

            remove_existing(&destination)?;
            copy_tree(&source, &destination)?;
            info!("copied {:?} -> {:?}", source.display(), destination.display());
            report.copied.push(relative.into());
        }

        Ok(report)
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(MirrorError::io(err, path)),
    };

    debug!("remove {:?}", path.display());
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .map_err(|err| MirrorError::io(err, path))
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| MirrorError::io(err, parent))?;
    }

    if source.is_file() {
        return copy_file(source, destination);
    }

    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| MirrorError::io(io::Error::other("entry outside source tree"), entry.path()))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| MirrorError::io(err, &target))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    let metadata = fs::metadata(source).map_err(|err| MirrorError::io(err, source))?;
    let mut reader = File::open(source).map_err(|err| MirrorError::io(err, source))?;
    let mut writer = File::create(destination).map_err(|err| MirrorError::io(err, destination))?;
    io::copy(&mut reader, &mut writer).map_err(|err| MirrorError::io(err, destination))?;

    // INVARIANT: Times first, permissions last, read-only files stay writable until the end.
    let mut times = FileTimes::new();
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    writer
        .set_times(times)
        .map_err(|err| MirrorError::io(err, destination))?;
    drop(writer);

    fs::set_permissions(destination, metadata.permissions())
        .map_err(|err| MirrorError::io(err, destination))
}

/// Tree mirroring error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Filesystem operation failed on target path.
    #[error("failed to mirror {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Source directory cannot be traversed.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

impl MirrorError {
    fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write};

    fn sparse(rules: &[&str]) -> Vec<SparsePath> {
        rules
            .iter()
            .map(|rule| SparsePath::try_from(*rule).unwrap())
            .collect()
    }

    #[test]
    fn copy_replaces_destination_wholesale() -> anyhow::Result<()> {
        let from = tempfile::tempdir()?;
        let to = tempfile::tempdir()?;
        create_dir_all(from.path().join("lua/plug"))?;
        write(from.path().join("lua/plug/init.lua"), "return {}\n")?;
        create_dir_all(to.path().join("lua/plug"))?;
        write(to.path().join("lua/plug/stale.lua"), "stale\n")?;
        write(to.path().join("keep.txt"), "untouched\n")?;

        let report = TreeMirror::copy(&sparse(&["lua/"]), from.path(), to.path())?;

        assert_eq!(report.copied, vec![PathBuf::from("lua")]);
        assert!(report.skipped.is_empty());
        assert_eq!(read_to_string(to.path().join("lua/plug/init.lua"))?, "return {}\n");
        assert!(!to.path().join("lua/plug/stale.lua").exists());
        assert_eq!(read_to_string(to.path().join("keep.txt"))?, "untouched\n");

        Ok(())
    }

    #[test]
    fn copy_skips_missing_sources() -> anyhow::Result<()> {
        let from = tempfile::tempdir()?;
        let to = tempfile::tempdir()?;
        create_dir_all(from.path().join("plugin"))?;
        write(from.path().join("plugin/plug.lua"), "vim.g.plug = 1\n")?;

        let report = TreeMirror::copy(
            &sparse(&["lua/", "plugin/plug.lua"]),
            from.path(),
            to.path(),
        )?;

        assert_eq!(report.copied, vec![PathBuf::from("plugin/plug.lua")]);
        assert_eq!(report.skipped, vec![PathBuf::from("lua")]);
        assert_eq!(read_to_string(to.path().join("plugin/plug.lua"))?, "vim.g.plug = 1\n");
        assert!(!to.path().join("lua").exists());

        Ok(())
    }

    #[test]
    fn copy_keeps_empty_directories_and_mtime() -> anyhow::Result<()> {
        let from = tempfile::tempdir()?;
        let to = tempfile::tempdir()?;
        create_dir_all(from.path().join("lua/empty"))?;
        write(from.path().join("lua/file.lua"), "x\n")?;
        let mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(from.path().join("lua/file.lua"))?
            .set_modified(mtime)?;

        TreeMirror::copy(&sparse(&["lua"]), from.path(), to.path())?;

        assert!(to.path().join("lua/empty").is_dir());
        assert_eq!(fs::metadata(to.path().join("lua/file.lua"))?.modified()?, mtime);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn copy_preserves_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let from = tempfile::tempdir()?;
        let to = tempfile::tempdir()?;
        create_dir_all(from.path().join("bin"))?;
        write(from.path().join("bin/run.sh"), "#!/bin/sh\n")?;
        fs::set_permissions(from.path().join("bin/run.sh"), fs::Permissions::from_mode(0o755))?;

        TreeMirror::copy(&sparse(&["bin/"]), from.path(), to.path())?;

        let mode = fs::metadata(to.path().join("bin/run.sh"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        Ok(())
    }
}
