// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control gateway.
//!
//! Forkpatch never implements Git itself. Every fetch, checkout, diff, and
//! apply goes through the external Git binary, and forkpatch only
//! orchestrates invocations and interprets their exit status. The [`Vcs`]
//! trait keeps that operation set narrow so a library backed implementation
//! or a test double can stand in for [`GitCli`] without touching the sync
//! workflows.
//!
//! All calls are blocking, and none of them are retried. A non-zero exit
//! status is always reported as [`VcsError::Failure`] with the captured
//! standard error, except for three-way patch application, where a non-zero
//! status means the patch conflicts (see [`ApplyOutcome`]).

use std::{
    ffi::{OsStr, OsString},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};
use tracing::{debug, instrument};

/// Identity used for synthetic commits in scratch checkouts.
const SYNTHETIC_NAME: &str = "forkpatch";
const SYNTHETIC_EMAIL: &str = "forkpatch@localhost";

/// Narrow set of version control operations needed by the sync workflows.
pub trait Vcs {
    /// Initialize empty repository at work tree.
    fn init(&self, worktree: &Path) -> Result<()>;

    /// Register remote under target name.
    fn add_remote(&self, worktree: &Path, name: &str, url: &str) -> Result<()>;

    /// Set repository local configuration value.
    fn set_config(&self, worktree: &Path, key: &str, value: &str) -> Result<()>;

    /// Fetch from remote, optionally only one reference at a given depth.
    fn fetch(
        &self,
        worktree: &Path,
        remote: &str,
        reference: Option<&str>,
        depth: Option<u32>,
    ) -> Result<()>;

    /// Check out reference in detached state.
    fn checkout(&self, worktree: &Path, reference: &str) -> Result<()>;

    /// Re-apply sparse checkout rules to the work tree.
    fn reapply_sparsity(&self, worktree: &Path) -> Result<()>;

    /// Porcelain status of work tree. Empty output means clean.
    fn status(&self, worktree: &Path) -> Result<String>;

    /// Resolve revision to a full object name.
    fn rev_parse(&self, worktree: &Path, revision: &str) -> Result<String>;

    /// Produce patch text for target range.
    fn diff(&self, worktree: &Path, range: DiffRange<'_>) -> Result<String>;

    /// Record untracked paths as intent-to-add so they show up in diffs.
    fn intent_to_add(&self, worktree: &Path, paths: &[&Path]) -> Result<()>;

    /// Stage every change in the work tree.
    fn stage_all(&self, worktree: &Path) -> Result<()>;

    /// Commit staged changes, even when nothing changed.
    fn commit(&self, worktree: &Path, message: &str) -> Result<()>;

    /// Apply patch text with three-way fallback.
    fn apply_three_way(&self, worktree: &Path, patch: &str) -> Result<ApplyOutcome>;

    /// Discard index and work tree changes, including untracked files.
    fn restore(&self, worktree: &Path) -> Result<()>;
}

/// What a diff compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRange<'a> {
    /// Uncommitted work tree changes against the index.
    WorkTree,

    /// One commit against another.
    Commits { from: &'a str, to: &'a str },
}

/// Result of three-way patch application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Patch applied cleanly.
    Applied,

    /// Patch could not be applied cleanly. Holds Git's report.
    Conflict(String),
}

/// Captured output of a single Git invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Gateway through the external Git binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
}

impl GitCli {
    /// Construct new gateway calling target Git binary.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run Git in work tree, feeding optional standard input.
    ///
    /// Never fails on a non-zero exit status, the caller decides what that
    /// status means.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Spawn`] if Git cannot be executed.
    pub fn run(
        &self,
        worktree: &Path,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
        input: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect::<Vec<_>>();
        debug!("git -C {:?} {:?}", worktree.display(), args);

        let mut command = Command::new(&self.program);
        command
            .arg("-C")
            .arg(worktree)
            .args(&args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_err = |err| VcsError::Spawn {
            source: err,
            program: self.program.clone(),
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            // INVARIANT: Git may exit before reading everything, keep its status.
            match stdin.write_all(input) {
                Err(err) if err.kind() != ErrorKind::BrokenPipe => return Err(spawn_err(err)),
                _ => {}
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        Ok(CommandOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
        })
    }

    fn run_checked(
        &self,
        operation: &str,
        worktree: &Path,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    ) -> Result<CommandOutput> {
        let output = self.run(worktree, args, None)?;
        if !output.status.success() {
            return Err(VcsError::Failure {
                operation: operation.into(),
                worktree: worktree.into(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    fn run_stdout(
        &self,
        operation: &str,
        worktree: &Path,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    ) -> Result<String> {
        let output = self.run_checked(operation, worktree, args)?;
        String::from_utf8(output.stdout).map_err(|err| VcsError::NonUtf8 {
            operation: operation.into(),
            source: err,
        })
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Vcs for GitCli {
    fn init(&self, worktree: &Path) -> Result<()> {
        self.run_checked("init", worktree, ["init", "--quiet"])?;
        Ok(())
    }

    fn add_remote(&self, worktree: &Path, name: &str, url: &str) -> Result<()> {
        self.run_checked("remote", worktree, ["remote", "add", name, url])?;
        Ok(())
    }

    fn set_config(&self, worktree: &Path, key: &str, value: &str) -> Result<()> {
        self.run_checked("config", worktree, ["config", key, value])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch(
        &self,
        worktree: &Path,
        remote: &str,
        reference: Option<&str>,
        depth: Option<u32>,
    ) -> Result<()> {
        let mut args = vec!["fetch".to_owned(), "--quiet".to_owned()];
        if let Some(depth) = depth {
            args.push(format!("--depth={depth}"));
        }
        args.push(remote.to_owned());
        args.extend(reference.map(str::to_owned));

        self.run_checked("fetch", worktree, args)?;
        Ok(())
    }

    fn checkout(&self, worktree: &Path, reference: &str) -> Result<()> {
        self.run_checked("checkout", worktree, ["checkout", "--quiet", "--detach", reference])?;
        Ok(())
    }

    fn reapply_sparsity(&self, worktree: &Path) -> Result<()> {
        self.run_checked("read-tree", worktree, ["read-tree", "-mu", "HEAD"])?;
        Ok(())
    }

    fn status(&self, worktree: &Path) -> Result<String> {
        self.run_stdout("status", worktree, ["status", "--porcelain"])
    }

    fn rev_parse(&self, worktree: &Path, revision: &str) -> Result<String> {
        let peeled = format!("{revision}^{{commit}}");
        self.run_stdout(
            "rev-parse",
            worktree,
            ["rev-parse", "--verify", "--quiet", peeled.as_str()],
        )
        .map(|oid| oid.trim().to_owned())
    }

    #[instrument(skip(self), level = "debug")]
    fn diff(&self, worktree: &Path, range: DiffRange<'_>) -> Result<String> {
        // INVARIANT: Header format stays fixed whatever the user's diff configuration.
        let mut args = vec![
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--no-textconv",
            "--no-relative",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            "--binary",
        ];
        if let DiffRange::Commits { from, to } = range {
            args.extend([from, to]);
        }

        self.run_stdout("diff", worktree, args)
    }

    fn intent_to_add(&self, worktree: &Path, paths: &[&Path]) -> Result<()> {
        // INVARIANT: Deleted files stay in the index so the diff reports them.
        let mut args: Vec<&OsStr> = vec![
            "add".as_ref(),
            "--intent-to-add".as_ref(),
            "--ignore-removal".as_ref(),
            "--".as_ref(),
        ];
        args.extend(paths.iter().map(|path| path.as_os_str()));

        self.run_checked("add", worktree, args)?;
        Ok(())
    }

    fn stage_all(&self, worktree: &Path) -> Result<()> {
        self.run_checked("add", worktree, ["add", "--all"])?;
        Ok(())
    }

    fn commit(&self, worktree: &Path, message: &str) -> Result<()> {
        let name = format!("user.name={SYNTHETIC_NAME}");
        let email = format!("user.email={SYNTHETIC_EMAIL}");
        self.run_checked(
            "commit",
            worktree,
            [
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "--quiet",
                "--allow-empty",
                "--no-verify",
                "--no-gpg-sign",
                "-m",
                message,
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self, patch), level = "debug")]
    fn apply_three_way(&self, worktree: &Path, patch: &str) -> Result<ApplyOutcome> {
        let output = self.run(
            worktree,
            ["apply", "--3way", "--whitespace=nowarn"],
            Some(patch.as_bytes()),
        )?;

        if output.status.success() {
            return Ok(ApplyOutcome::Applied);
        }

        let mut details = String::from_utf8_lossy(&output.stdout).trim_end().to_owned();
        if !output.stderr.is_empty() {
            if !details.is_empty() {
                details.push('\n');
            }
            details.push_str(&output.stderr);
        }

        Ok(ApplyOutcome::Conflict(details))
    }

    fn restore(&self, worktree: &Path) -> Result<()> {
        self.run_checked("reset", worktree, ["reset", "--quiet", "--hard", "HEAD"])?;
        self.run_checked("clean", worktree, ["clean", "--quiet", "-f", "-d", "-x"])?;
        Ok(())
    }
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Git binary cannot be executed or talked to.
    #[error("failed to run {:?}", program)]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Git exited with non-zero status.
    #[error("git {operation} failed in {:?} ({status}):\n{stderr}", worktree.display())]
    Failure {
        operation: String,
        worktree: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    /// Git produced output that is not valid UTF-8.
    #[error("git {operation} produced output that is not valid UTF-8")]
    NonUtf8 {
        operation: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
