// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{remove, seed_upstream, snapshot, write_file, Sandbox};

use anyhow::Result;
use forkpatch::{
    sync::{scratch::ScratchState, Outcome, SyncEngine, SyncError},
    vcs::GitCli,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs::{read_to_string, write};

#[test]
fn repack_then_update_round_trips_live_tree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 42\nreturn M\n")?;
    write_file(&part.local_path, "lua/plug/extra.lua", "return 'extra'\n")?;
    remove(&part.local_path, "lua/plug/util.lua")?;
    let before = snapshot(&part)?;

    assert_eq!(engine.repack(&part)?, Outcome::Repacked);
    assert_eq!(engine.scratch_state(&part)?, ScratchState::Clean);

    let patch = read_to_string(&part.patch_path)?;
    assert!(patch.contains("+M.value = 42"));
    assert!(patch.contains("+++ b/lua/plug/extra.lua"));
    assert!(patch.contains("--- a/lua/plug/util.lua"));
    assert!(!patch.contains('\r'));

    write_file(&part.local_path, "lua/plug/init.lua", "garbage\n")?;
    remove(&part.local_path, "lua/plug/extra.lua")?;
    assert_eq!(engine.update(&part)?, Outcome::Synced);

    assert_eq!(snapshot(&part)?, before);

    Ok(())
}

#[test]
fn repack_unchanged_tree_leaves_patch_untouched() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write(&part.patch_path, "previous patch\n")?;

    assert_eq!(engine.repack(&part)?, Outcome::NoChanges);
    assert_eq!(read_to_string(&part.patch_path)?, "previous patch\n");
    assert_eq!(engine.scratch_state(&part)?, ScratchState::Clean);

    Ok(())
}

#[test]
fn repack_with_missing_sparse_path_touches_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    remove(&part.local_path, "plugin/plug.lua")?;

    let result = engine.repack(&part);

    match result {
        Err(SyncError::LocalPathMissing { path, .. }) => {
            assert_eq!(path, part.local_path.join("plugin/plug.lua"));
        }
        other => panic!("expected missing local path, got {other:?}"),
    }
    assert!(!part.patch_path.exists());
    assert!(!part.scratch_path.exists());

    Ok(())
}

#[test]
fn repack_reuses_kept_scratch_checkout() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "first\n")?;
    engine.repack(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "second\n")?;
    assert_eq!(engine.repack(&part)?, Outcome::Repacked);

    let patch = read_to_string(&part.patch_path)?;
    assert!(patch.contains("+second"));
    assert!(!patch.contains("+first"));

    Ok(())
}

#[sealed_test]
fn repack_under_custom_diff_config_still_round_trips() -> Result<()> {
    let home = tempfile::tempdir()?;
    let gitconfig = home.path().join(".gitconfig");
    write(
        &gitconfig,
        "[diff]\n\tnoprefix = true\n\tmnemonicPrefix = true\n[color]\n\tdiff = always\n",
    )?;
    std::env::set_var("GIT_CONFIG_GLOBAL", &gitconfig);

    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 11\nreturn M\n")?;
    assert_eq!(engine.repack(&part)?, Outcome::Repacked);

    let patch = read_to_string(&part.patch_path)?;
    assert!(patch.contains("--- a/lua/plug/init.lua\n+++ b/lua/plug/init.lua\n"));
    assert!(!patch.contains('\x1b'));

    write_file(&part.local_path, "lua/plug/init.lua", "garbage\n")?;
    assert_eq!(engine.update(&part)?, Outcome::Synced);
    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/init.lua"))?,
        "local M = {}\nM.value = 11\nreturn M\n"
    );

    Ok(())
}
