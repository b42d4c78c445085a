// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where an editor keeps its configuration and data directories.
//! Neovim style layout is assumed, i.e., the same locations that
//! `stdpath("config")` and `stdpath("data")` report:
//!
//! | Platform | Config                        | Data                               |
//! |----------|-------------------------------|------------------------------------|
//! | Windows  | `%LOCALAPPDATA%\<editor>`     | `%LOCALAPPDATA%\<editor>-data`     |
//! | Others   | `$XDG_CONFIG_HOME/<editor>`   | `$XDG_DATA_HOME/<editor>`          |
//!
//! On non-Windows platforms the XDG variables fall back to `~/.config` and
//! `~/.local/share` respectively, even on macOS.

use std::path::{Path, PathBuf};

/// Default name of the manifest inside the editor configuration directory.
pub const MANIFEST_FILE_NAME: &str = "forkpatch.toml";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine configuration directory of target editor.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
#[cfg(windows)]
pub fn editor_config_dir(editor: &str) -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|path| path.join(editor))
        .ok_or(NoWayHome)
}

/// Determine configuration directory of target editor.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
#[cfg(not(windows))]
pub fn editor_config_dir(editor: &str) -> Result<PathBuf> {
    xdg_or_home("XDG_CONFIG_HOME", ".config").map(|path| path.join(editor))
}

/// Determine data directory of target editor.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
#[cfg(windows)]
pub fn editor_data_dir(editor: &str) -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|path| path.join(format!("{editor}-data")))
        .ok_or(NoWayHome)
}

/// Determine data directory of target editor.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
#[cfg(not(windows))]
pub fn editor_data_dir(editor: &str) -> Result<PathBuf> {
    xdg_or_home("XDG_DATA_HOME", ".local/share").map(|path| path.join(editor))
}

/// Determine default manifest path for target editor.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_manifest_path(editor: &str) -> Result<PathBuf> {
    editor_config_dir(editor).map(|path| path.join(MANIFEST_FILE_NAME))
}

#[cfg(not(windows))]
fn xdg_or_home(var: &str, fallback: impl AsRef<Path>) -> Result<PathBuf> {
    // INVARIANT: Relative or empty XDG paths are ignored.
    match std::env::var_os(var).map(PathBuf::from) {
        Some(path) if path.is_absolute() => Ok(path),
        _ => home_dir().map(|home| home.join(fallback)),
    }
}

/// Editor directories that relative manifest paths are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Editor configuration directory, home of live trees and patch files.
    pub config_dir: PathBuf,

    /// Editor data directory, home of scratch checkouts.
    pub data_dir: PathBuf,
}

impl Layout {
    /// Construct new layout from explicit directories.
    pub fn new(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Construct layout from platform defaults of target editor.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory path cannot be determined.
    pub fn for_editor(editor: &str) -> Result<Self> {
        Ok(Self::new(editor_config_dir(editor)?, editor_data_dir(editor)?))
    }

    /// Resolve path relative to configuration directory.
    ///
    /// Absolute paths are returned untouched.
    pub fn config_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Resolve path relative to data directory.
    ///
    /// Absolute paths are returned untouched.
    pub fn data_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.data_dir.join(path)
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
