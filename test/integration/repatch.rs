// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{human_git, seed_upstream, write_file, Sandbox, INIT_LUA};

use anyhow::Result;
use forkpatch::{
    sync::{scratch::ScratchError, Outcome, SyncEngine, SyncError},
    vcs::GitCli,
};
use pretty_assertions::assert_eq;
use std::fs::read_to_string;

#[test]
fn repatch_from_live_tree_without_scratch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "local M = {}\nM.value = 7\nreturn M\n")?;

    assert_eq!(engine.repatch(&part)?, Outcome::Repatched);
    assert!(!part.scratch_path.exists());
    assert!(read_to_string(&part.patch_path)?.contains("+M.value = 7"));

    write_file(&part.local_path, "lua/plug/init.lua", INIT_LUA)?;
    engine.update(&part)?;
    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/init.lua"))?,
        "local M = {}\nM.value = 7\nreturn M\n"
    );

    Ok(())
}

#[test]
fn repatch_unchanged_live_tree_reports_no_changes() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;

    assert_eq!(engine.repatch(&part)?, Outcome::NoChanges);
    assert!(!part.patch_path.exists());
    assert!(!part.scratch_path.exists());

    Ok(())
}

#[test]
fn repatch_after_repack_uses_live_tree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    write_file(&part.local_path, "lua/plug/init.lua", "packed\n")?;
    engine.repack(&part)?;
    let packed = read_to_string(&part.patch_path)?;

    assert_eq!(engine.repatch(&part)?, Outcome::Repatched);
    assert_eq!(read_to_string(&part.patch_path)?, packed);
    assert!(!part.scratch_path.exists());

    Ok(())
}

#[test]
fn repatch_refuses_uncommitted_resolution() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let commit = seed_upstream(&sandbox.upstream)?;
    let part = sandbox.part(&commit)?;
    let engine = SyncEngine::new(GitCli::default());

    engine.update(&part)?;
    engine.repack(&part)?;
    write_file(&part.scratch_path, "lua/plug/init.lua", "half resolved\n")?;

    let result = engine.repatch(&part);

    assert!(matches!(
        result,
        Err(SyncError::Scratch(ScratchError::DirtyWorktree { .. }))
    ));
    assert_eq!(
        read_to_string(part.scratch_path.join("lua/plug/init.lua"))?,
        "half resolved\n"
    );

    Ok(())
}

#[test]
fn repatch_after_resolution_reproduces_it_on_update() -> Result<()> {
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
    assert!(matches!(
        engine.update(&part),
        Err(SyncError::UnmergedConflict { .. })
    ));

    // Dirty scratch checkout blocks a second update until resolution is committed.
    let resolved = "local M = {}\nM.value = 5\nreturn M\n";
    write_file(&part.scratch_path, "lua/plug/init.lua", resolved)?;
    assert!(matches!(
        engine.update(&part),
        Err(SyncError::Scratch(ScratchError::DirtyWorktree { .. }))
    ));

    human_git(&part.scratch_path, &["add", "--all"])?;
    human_git(&part.scratch_path, &["commit", "--quiet", "-m", "resolve conflict"])?;
    assert_eq!(engine.repatch(&part)?, Outcome::Repatched);
    assert!(!part.scratch_path.exists());

    write_file(&part.local_path, "lua/plug/init.lua", "stale\n")?;
    assert_eq!(engine.update(&part)?, Outcome::Synced);
    assert_eq!(
        read_to_string(part.local_path.join("lua/plug/init.lua"))?,
        resolved
    );

    Ok(())
}
