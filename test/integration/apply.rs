// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{seed_upstream, Sandbox, INIT_LUA};

use anyhow::Result;
use forkpatch::{config::Manifest, sync::SyncEngine, vcs::GitCli};
use pretty_assertions::assert_eq;
use std::fs::read_to_string;

#[test]
fn bootstrap_creates_directories_and_installs_checkouts() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let manifest: Manifest = format!(
        r#"
        directories = ["piston/undodir", "piston/swap"]

        [checkout.full]
        repo = "{url}"
        ref = "main"
        data-path = "lazy/full"

        [checkout.pinned]
        repo = "{url}"
        tag = "{commit}"
        data-path = "lazy/pinned"
        sparse = ["lua/"]
        shallow = true
        "#,
        url = sandbox.upstream.url(),
    )
    .parse()?;

    let directories = manifest
        .directories
        .iter()
        .map(|directory| sandbox.layout.data_path(directory))
        .collect::<Vec<_>>();
    let checkouts = manifest.resolve_checkouts(&sandbox.layout);
    let engine = SyncEngine::new(GitCli::default());

    let created = engine.bootstrap(&directories, &checkouts)?;

    assert_eq!(created, directories);
    assert!(directories.iter().all(|directory| directory.is_dir()));

    let full = sandbox.layout.data_path("lazy/full");
    assert_eq!(read_to_string(full.join("README.md"))?, "# plug\n");
    assert_eq!(read_to_string(full.join("lua/plug/init.lua"))?, INIT_LUA);

    let pinned = sandbox.layout.data_path("lazy/pinned");
    assert_eq!(read_to_string(pinned.join("lua/plug/init.lua"))?, INIT_LUA);
    assert!(!pinned.join("README.md").exists());
    assert!(!pinned.join("plugin").exists());

    // Second run only refreshes what is already there.
    let created = engine.bootstrap(&directories, &checkouts)?;
    assert!(created.is_empty());
    assert_eq!(read_to_string(pinned.join("lua/plug/init.lua"))?, INIT_LUA);

    Ok(())
}

#[test]
fn bootstrap_follows_moved_branch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    seed_upstream(&sandbox.upstream)?;
    let manifest: Manifest = format!(
        r#"
        [checkout.tracking]
        repo = "{url}"
        ref = "main"
        data-path = "lazy/tracking"
        "#,
        url = sandbox.upstream.url(),
    )
    .parse()?;
    let checkouts = manifest.resolve_checkouts(&sandbox.layout);
    let engine = SyncEngine::new(GitCli::default());

    engine.bootstrap(&[], &checkouts)?;
    sandbox
        .upstream
        .commit(&[("lua/plug/init.lua", Some("return 'moved'\n"))], "feat: move")?;
    engine.bootstrap(&[], &checkouts)?;

    let tracking = sandbox.layout.data_path("lazy/tracking");
    assert_eq!(
        read_to_string(tracking.join("lua/plug/init.lua"))?,
        "return 'moved'\n"
    );

    Ok(())
}
