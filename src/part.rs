// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracked part representation.
//!
//! A __part__ is a third-party tree whose local divergence from a pinned
//! upstream commit lives in a single patch file. Every workflow operates on
//! exactly one part, and all of them read the same sparse path set from the
//! manifest so that update, repack, and repatch always agree on what is
//! tracked.

use crate::{config::SparsePath, sync::scratch::CheckoutTarget};

use std::path::PathBuf;

/// Fully resolved part ready for a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPart {
    /// Part name from the manifest.
    pub name: String,

    /// Remote locator, either `owner/name` on GitHub or a full URL.
    pub repository: String,

    /// Upstream commit the patch applies to.
    pub pinned_commit: String,

    /// Tracked path prefixes relative to the repository root.
    pub sparse_paths: Vec<SparsePath>,

    /// Location of the disposable scratch checkout.
    pub scratch_path: PathBuf,

    /// Location of the live, human-edited tree.
    pub local_path: PathBuf,

    /// Location of the persisted patch file.
    pub patch_path: PathBuf,
}

impl TrackedPart {
    /// Shallow sparse checkout of the pinned commit at the scratch path.
    pub fn scratch_target(&self) -> CheckoutTarget {
        CheckoutTarget {
            name: self.name.clone(),
            repository: self.repository.clone(),
            reference: self.pinned_commit.clone(),
            path: self.scratch_path.clone(),
            sparse: self.sparse_paths.clone(),
            shallow: true,
        }
    }

    /// Live counterparts of every sparse path that do not exist.
    pub fn missing_local_paths(&self) -> Vec<PathBuf> {
        self.sparse_paths
            .iter()
            .map(|sparse| self.local_path.join(sparse.relative()))
            .filter(|path| !path.exists())
            .collect()
    }
}

/// Expand remote locator into a URL git can fetch from.
///
/// Bare `owner/name` locators are treated as GitHub repositories. Full URLs,
/// scp-like addresses, and filesystem paths are returned untouched.
pub fn remote_url(repository: &str) -> String {
    let is_verbatim = repository.contains("://")
        || repository.starts_with("git@")
        || repository.starts_with('/')
        || repository.starts_with('.')
        || repository.starts_with('~')
        || std::path::Path::new(repository).is_absolute();

    if is_verbatim {
        repository.to_owned()
    } else {
        format!("https://github.com/{repository}")
    }
}
