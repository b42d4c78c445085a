// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use forkpatch::{
    config::Manifest,
    path::{default_manifest_path, Layout, MANIFEST_FILE_NAME},
    sync::{scratch::ScratchState, Outcome, SyncEngine},
    vcs::GitCli,
    TrackedPart,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{io::IsTerminal, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "forkpatch [options] <forkpatch-command> [part]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let context = Context::load(&self.global)?;
        match self.command {
            Command::Update(opts) => run_update(&context, opts),
            Command::Repatch(opts) => run_repatch(&context, opts),
            Command::Repack(opts) => run_repack(&context, opts),
            Command::Apply => run_apply(&context),
            Command::Abort(opts) => run_abort(&context, opts),
            Command::List => run_list(&context),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Rebuild live tree from pinned upstream plus patch.
    #[command(override_usage = "forkpatch update [options] [part]")]
    Update(PartOptions),

    /// Regenerate patch from resolved scratch checkout or live tree.
    #[command(override_usage = "forkpatch repatch [options] [part]")]
    Repatch(PartOptions),

    /// Regenerate patch from live tree and keep scratch checkout.
    #[command(override_usage = "forkpatch repack [options] [part]")]
    Repack(PartOptions),

    /// Create data directories and install pinned checkouts.
    #[command(override_usage = "forkpatch apply [options]")]
    Apply,

    /// Discard scratch checkout of a part.
    #[command(override_usage = "forkpatch abort [options] [part]")]
    Abort(AbortOptions),

    /// List configured parts and checkouts.
    #[command(override_usage = "forkpatch list [options]")]
    List,
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Path to manifest file.
    #[arg(short, long, global = true, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Editor configuration directory holding live trees and patches.
    #[arg(short, long, global = true, value_name = "path")]
    pub config_dir: Option<PathBuf>,

    /// Editor data directory holding scratch checkouts.
    #[arg(short, long, global = true, value_name = "path")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PartOptions {
    /// Name of part, optional if only one part is configured.
    #[arg(value_name = "part")]
    pub part: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AbortOptions {
    /// Name of part, optional if only one part is configured.
    #[arg(value_name = "part")]
    pub part: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub force: bool,
}

/// Manifest and editor layout shared by every command.
struct Context {
    manifest: Manifest,
    layout: Layout,
    engine: SyncEngine<GitCli>,
}

impl Context {
    fn load(opts: &GlobalOptions) -> Result<Self> {
        let manifest_path = match (&opts.manifest, &opts.config_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(config_dir)) => config_dir.join(MANIFEST_FILE_NAME),
            (None, None) => default_manifest_path(forkpatch::config::DEFAULT_EDITOR)?,
        };
        let manifest = Manifest::load(&manifest_path)?;

        let mut layout = Layout::for_editor(manifest.editor())?;
        if let Some(config_dir) = &opts.config_dir {
            layout.config_dir = config_dir.clone();
        }
        if let Some(data_dir) = &opts.data_dir {
            layout.data_dir = data_dir.clone();
        }

        let engine = SyncEngine::new(GitCli::default())
            .with_progress(std::io::stderr().is_terminal());

        Ok(Self {
            manifest,
            layout,
            engine,
        })
    }

    fn part(&self, name: Option<&str>) -> Result<TrackedPart> {
        Ok(self.manifest.resolve_part(name, &self.layout)?)
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_update(context: &Context, opts: PartOptions) -> Result<()> {
    let part = context.part(opts.part.as_deref())?;
    report(context.engine.update(&part)?);
    Ok(())
}

fn run_repatch(context: &Context, opts: PartOptions) -> Result<()> {
    let part = context.part(opts.part.as_deref())?;
    report(context.engine.repatch(&part)?);
    Ok(())
}

fn run_repack(context: &Context, opts: PartOptions) -> Result<()> {
    let part = context.part(opts.part.as_deref())?;
    report(context.engine.repack(&part)?);
    Ok(())
}

fn run_apply(context: &Context) -> Result<()> {
    let directories = context
        .manifest
        .directories
        .iter()
        .map(|directory| context.layout.data_path(directory))
        .collect::<Vec<_>>();
    let checkouts = context.manifest.resolve_checkouts(&context.layout);

    let created = context.engine.bootstrap(&directories, &checkouts)?;
    info!(
        "created {} directories, installed {} checkouts",
        created.len(),
        checkouts.len()
    );

    Ok(())
}

fn run_abort(context: &Context, opts: AbortOptions) -> Result<()> {
    let part = context.part(opts.part.as_deref())?;
    if !part.scratch_path.exists() {
        info!("no scratch checkout for {}", part.name);
        return Ok(());
    }

    if !opts.force {
        let prompt = format!(
            "discard scratch checkout at {:?}, including unfinished resolution?",
            part.scratch_path.display()
        );
        if !Confirm::new(&prompt).with_default(false).prompt()? {
            warn!("abort cancelled");
            return Ok(());
        }
    }

    context.engine.abort(&part)?;
    Ok(())
}

fn run_list(context: &Context) -> Result<()> {
    for name in context.manifest.parts.keys() {
        let part = context.part(Some(name))?;
        let state = match context.engine.scratch_state(&part) {
            Ok(ScratchState::Absent) => "absent".to_owned(),
            Ok(ScratchState::Clean) => "clean".to_owned(),
            Ok(ScratchState::Dirty) => "dirty".to_owned(),
            Err(err) => format!("unknown ({err})"),
        };

        println!("part {} ({} @ {})", part.name, part.repository, part.pinned_commit);
        println!("  live tree: {}", part.local_path.display());
        println!("  patch:     {}", part.patch_path.display());
        println!("  scratch:   {} [{state}]", part.scratch_path.display());
        let sparse = part
            .sparse_paths
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!("  sparse:    {}", sparse.join(", "));
    }

    for checkout in context.manifest.resolve_checkouts(&context.layout) {
        println!(
            "checkout {} ({} @ {})",
            checkout.name, checkout.repository, checkout.reference
        );
        println!("  path:      {}", checkout.path.display());
    }

    Ok(())
}

fn report(outcome: Outcome) {
    match outcome {
        Outcome::Synced => info!("live tree synced"),
        Outcome::Repatched => info!("patch regenerated, scratch checkout removed"),
        Outcome::Repacked => info!("patch regenerated, scratch checkout kept"),
        Outcome::NoChanges => info!("no changes, patch left untouched"),
    }
}
