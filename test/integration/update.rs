// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{seed_upstream, snapshot, write_file, Sandbox, INIT_LUA, PLUGIN_LUA, UTIL_LUA};

use anyhow::Result;
use forkpatch::{
    sync::{Outcome, SyncEngine, SyncError},
    vcs::GitCli,
};
use pretty_assertions::assert_eq;
use std::fs::{read_to_string, write};

#[test]
fn update_without_patch_installs_pristine_upstream() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    assert_eq!(engine.update(&part)?, Outcome::Synced);

    let local = &part.local_path;
    assert_eq!(read_to_string(local.join("lua/plug/init.lua"))?, INIT_LUA);
    assert_eq!(read_to_string(local.join("lua/plug/util.lua"))?, UTIL_LUA);
    assert_eq!(read_to_string(local.join("plugin/plug.lua"))?, PLUGIN_LUA);
    assert!(!local.join("README.md").exists());
    assert!(!local.join("plugin/other.lua").exists());
    assert!(!part.scratch_path.exists());
    assert!(!part.patch_path.exists());

    Ok(())
}

#[test]
fn update_replaces_stale_live_tree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());
    write_file(&part.local_path, "lua/plug/stale.lua", "return nil\n")?;
    write_file(&part.local_path, "notes.txt", "outside sparse paths\n")?;

    engine.update(&part)?;

    assert!(!part.local_path.join("lua/plug/stale.lua").exists());
    assert_eq!(
        read_to_string(part.local_path.join("notes.txt"))?,
        "outside sparse paths\n"
    );

    Ok(())
}

#[test]
fn update_twice_is_idempotent() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 2\nreturn M\n")?;
    assert_eq!(engine.repack(&part)?, Outcome::Repacked);

    assert_eq!(engine.update(&part)?, Outcome::Synced);
    let first = snapshot(&part)?;
    assert_eq!(engine.update(&part)?, Outcome::Synced);
    let second = snapshot(&part)?;

    assert_eq!(first, second);
    assert!(!part.scratch_path.exists());

    Ok(())
}

#[test]
fn update_onto_new_pin_carries_patch_forward() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let old = seed_upstream(&sandbox.upstream)?;
    let engine = SyncEngine::new(GitCli::default());

    let part = sandbox.part(&old)?;
    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/util.lua", "return { helper = false }\n")?;
    engine.repack(&part)?;
    engine.abort(&part)?;

    let new = sandbox.upstream.commit(
        &[("lua/plug/init.lua", Some("local M = {}\nM.value = 1\nM.extra = true\nreturn M\n"))],
        "feat: add extra",
    )?;
    let part = sandbox.part(&new)?;
    assert_eq!(engine.update(&part)?, Outcome::Synced);

    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/init.lua"))?,
        "local M = {}\nM.value = 1\nM.extra = true\nreturn M\n"
    );
    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/util.lua"))?,
        "return { helper = false }\n"
    );

    Ok(())
}

#[test]
fn update_with_conflicting_patch_keeps_scratch_and_live_tree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let old = seed_upstream(&sandbox.upstream)?;
    let engine = SyncEngine::new(GitCli::default());

    let part = sandbox.part(&old)?;
    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 2\nreturn M\n")?;
    engine.repack(&part)?;
    engine.abort(&part)?;

    let new = sandbox.upstream.commit(
        &[("lua/plug/init.lua", Some("local M = {}\nM.value = 3\nreturn M\n"))],
        "feat: bump value",
    )?;
    let part = sandbox.part(&new)?;
    let before = snapshot(&part)?;

    let result = engine.update(&part);

    match result {
        Err(SyncError::UnmergedConflict { part: name, scratch, .. }) => {
            assert_eq!(name, "plug");
            assert_eq!(scratch, part.scratch_path);
        }
        other => panic!("expected unmerged conflict, got {other:?}"),
    }
    assert!(part.scratch_path.join(".git").exists());
    assert_eq!(snapshot(&part)?, before);

    Ok(())
}

#[test]
fn update_reads_patch_with_crlf_terminators() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 9\nreturn M\n")?;
    engine.repack(&part)?;
    let patch = read_to_string(&part.patch_path)?;
    write(&part.patch_path, patch.replace('\n', "\r\n"))?;
    write_file(&part.local_path, "lua/plug/init.lua", INIT_LUA)?;

    assert_eq!(engine.update(&part)?, Outcome::Synced);
    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/init.lua"))?,
        "local M = {}\nM.value = 9\nreturn M\n"
    );

    Ok(())
}
