// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sparse checkout rule handling.
//!
//! Utilities to manage the sparsity rules that restrict a scratch checkout to
//! the tracked paths of a part.
//!
//! # Why Sparse Checkout?
//!
//! Git comes with a cool feature called __sparse checkout__. It allows the
//! user to reduce their work tree to a subset of tracked files. What gets
//! included in this reduced work tree is determined by a set of
//! __sparsity rules__. A sparsity rule is just a pattern of characters that
//! match tracked files for inclusion into the reduced work tree. The syntax
//! of a sparsity rule is the same as the gitignore syntax, with the exception
//! that the semantics are inverted. Thus, unlike gitignore semantics, sparsity
//! semantics do not include any tracked files by default such that each
//! sparsity rule determines what to _include_ instead of what to exclude.
//!
//! Forkpatch only ever needs a small subtree of a potentially large upstream
//! repository, e.g., the `lua/` and `plugin/` directories of an editor plugin.
//! Combined with a depth one fetch, sparse checkout keeps both network and
//! disk cost down to exactly what the patch touches.
//!
//! # Sparse Checkout Configuration File Layout
//!
//! Sparsity rules are stored in the gitdir at `$gitdir/info/sparse-checkout`,
//! one rule per line. Forkpatch writes this file directly in non-cone mode,
//! because sparse paths may name single files and not only directories.
//!
//! # See Also
//!
//! - [Man page sparse checkout](https://git-scm.com/docs/git-sparse-checkout)

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, read_to_string, write, OpenOptions},
    path::{Path, PathBuf},
};

/// Manage sparsity rules in sparse checkout file.
#[derive(Clone, Debug)]
pub struct SparseCheckoutFile {
    sparse_path: PathBuf,
}

impl SparseCheckoutFile {
    /// Construct new sparse checkout file handle.
    ///
    /// Creates the sparse checkout configuration file if it does not already
    /// exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::CreateSparseFile`] if sparse checkout
    ///   configuration file cannot be created if missing.
    pub fn new(gitdir: impl Into<PathBuf>) -> Result<Self> {
        let info = gitdir.into().join("info");
        let sparse_path = info.join("sparse-checkout");

        // INVARIANT: Create sparse checkout file if needed.
        create_dir_all(&info)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(false)
                    .open(&sparse_path)
            })
            .map_err(|err| SparseError::CreateSparseFile {
                source: err,
                sparse_path: sparse_path.clone(),
            })?;

        Ok(Self { sparse_path })
    }

    /// Edit sparsity rules.
    ///
    /// Read current rule set into [`SparseRules`] instance, and directly
    /// edit each rule before writing the results back into the sparse checkout
    /// configuration file. Nothing is written if the editor changed nothing.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::ReadSparseFile`] if sparse checkout
    ///   configuration file cannot be read.
    /// - Return [`SparseError::WriteSparseFile`] if rules cannot be written to
    ///   sparse checkout configuration file.
    pub fn edit<E>(&self, editor: E) -> Result<()>
    where
        E: FnOnce(&mut SparseRules),
    {
        let content =
            read_to_string(&self.sparse_path).map_err(|err| SparseError::ReadSparseFile {
                source: err,
                sparse_path: self.sparse_path.clone(),
            })?;

        let mut rules = SparseRules::from(content);
        editor(&mut rules);

        if !rules.changed {
            return Ok(());
        }

        write(&self.sparse_path, rules.to_string().as_bytes()).map_err(|err| {
            SparseError::WriteSparseFile {
                source: err,
                sparse_path: self.sparse_path.clone(),
            }
        })?;

        Ok(())
    }

    /// Replace whole rule set.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::ReadSparseFile`] or
    ///   [`SparseError::WriteSparseFile`] if file access fails.
    pub fn replace(&self, rules: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
        self.edit(|current| {
            let wanted = rules.into_iter().map(Into::into).collect::<HashSet<_>>();
            if current.rules != wanted {
                current.clear_rules();
                current.insert_rules(wanted);
            }
        })
    }
}

/// Sparsity rule editor.
///
/// # Invariant
///
/// - No duplicate sparsity rules.
/// - Rule insertion does not overwrite existing rules.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SparseRules {
    rules: HashSet<String>,
    changed: bool,
}

impl SparseRules {
    /// Insert a sparsity rule.
    pub fn insert_rule(&mut self, rule: impl Into<String>) {
        if self.rules.insert(rule.into()) {
            self.changed = true;
        }
    }

    /// Insert a listing of sparsity rules.
    pub fn insert_rules(&mut self, rules: impl IntoIterator<Item = impl Into<String>>) {
        for rule in rules {
            self.insert_rule(rule);
        }
    }

    /// Clear all sparsity rules.
    pub fn clear_rules(&mut self) {
        if !self.rules.is_empty() {
            self.rules.clear();
            self.changed = true;
        }
    }
}

impl Display for SparseRules {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut rules: Vec<_> = self.rules.iter().collect();
        rules.sort();

        for rule in rules {
            writeln!(fmt, "{rule}")?;
        }

        Ok(())
    }
}

impl From<String> for SparseRules {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

impl From<&str> for SparseRules {
    fn from(content: &str) -> Self {
        let rules = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect::<HashSet<_>>();

        Self {
            rules,
            changed: false,
        }
    }
}

/// Sparsity rule matcher that inverts gitignore semantics.
///
/// Takes a gitignore rule parser, and inverts incoming patterns to match
/// sparsity patterns instead. Paths are matched relative to the repository
/// root.
#[derive(Debug, Clone)]
pub struct SparseMatcher {
    matcher: Gitignore,
}

impl SparseMatcher {
    /// Construct new matcher for rule set rooted at repository root.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::Matcher`] if a rule cannot be parsed.
    pub fn new(
        root: impl AsRef<Path>,
        rules: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root.as_ref());
        // INVARIANT: Invert gitignore logic.
        //   - Ignore everything by default.
        //   - Invert '!' to mean to unignore.
        //   - Invert any rule without '!' to mean ignore.
        builder.add_line(None, "/*")?;
        for rule in rules {
            let rule = rule.as_ref();
            let is_negated = rule.starts_with('!');
            let pattern = rule.trim_start_matches('!');
            let is_dir = pattern.ends_with('/');

            if is_negated {
                builder.add_line(None, pattern)?;
                if is_dir {
                    builder.add_line(None, &format!("{pattern}**"))?;
                }
            } else {
                builder.add_line(None, &format!("!{pattern}"))?;
                if is_dir {
                    builder.add_line(None, &format!("!{pattern}**"))?;
                }
            }
        }

        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Check if repository relative file path is covered by the rules.
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        !self
            .matcher
            .matched_path_or_any_parents(path.as_ref(), false)
            .is_ignore()
    }
}

/// Sparsity rule management error types.
#[derive(Debug, thiserror::Error)]
pub enum SparseError {
    /// Sparse configuration file cannot be created when missing.
    #[error("failed to create sparse file at {:?}", sparse_path.display())]
    CreateSparseFile {
        #[source]
        source: std::io::Error,
        sparse_path: PathBuf,
    },

    /// Sparse configuration file cannot be read from.
    #[error("failed to read from sparse file at {:?}", sparse_path.display())]
    ReadSparseFile {
        #[source]
        source: std::io::Error,
        sparse_path: PathBuf,
    },

    /// Sparse configuration file cannot be written to.
    #[error("failed to write to sparse file at {:?}", sparse_path.display())]
    WriteSparseFile {
        #[source]
        source: std::io::Error,
        sparse_path: PathBuf,
    },

    /// Sparsity rule cannot be turned into a matcher.
    #[error(transparent)]
    Matcher(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SparseError> = std::result::Result<T, E>;
