// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep a locally customized fork of a third-party tree in sync with upstream.
//!
//! A __part__ is a subtree of some upstream repository, e.g., the `lua/` and
//! `plugin/` directories of an editor plugin, that lives inside a user's editor
//! configuration and carries local edits. Forkpatch stores those edits as one
//! patch file against a pinned upstream commit, and offers three workflows
//! over it:
//!
//! - __update__ rebuilds the live tree as pinned upstream plus patch.
//! - __repatch__ regenerates the patch after conflict resolution, or from the
//!   live tree.
//! - __repack__ regenerates the patch from the live tree.
//!
//! All Git work happens in a disposable __scratch checkout__ that is sparse
//! and shallow by default. See [`sync`] for the workflows and [`config`] for
//! the manifest layout.

pub mod config;
pub mod part;
pub mod path;
pub mod sync;
pub mod vcs;

pub use config::{ConfigError, Manifest, SparsePath};
pub use part::TrackedPart;
pub use path::Layout;
pub use sync::{Outcome, SyncEngine, SyncError};
pub use vcs::{GitCli, Vcs, VcsError};
