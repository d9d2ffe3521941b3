// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::project;
use crew_adapters::FakeGitOps;

fn manager() -> (tempfile::TempDir, WorktreeManager<FakeGitOps>, FakeGitOps) {
    let dir = tempfile::tempdir().unwrap();
    let git = FakeGitOps::new();
    let manager = WorktreeManager::new(&project(), dir.path().join("wt"), git.clone());
    (dir, manager, git)
}

#[tokio::test]
async fn create_then_get() {
    let (_dir, manager, git) = manager();
    let worktree = manager.create("task/t1/implement", "t1").await.unwrap();
    assert_eq!(worktree.branch, "task/t1/implement");
    assert!(!worktree.locked);

    assert_eq!(manager.get("t1").unwrap().path, worktree.path);
    assert!(git.ops().contains(&"worktree_add".to_string()));
}

#[tokio::test]
async fn one_worktree_per_task() {
    let (_dir, manager, _git) = manager();
    manager.create("b1", "t1").await.unwrap();
    let err = manager.create("b2", "t1").await.unwrap_err();
    assert!(matches!(err, WorktreeError::AlreadyExists(_)));
}

#[tokio::test]
async fn lock_is_a_visible_flag() {
    let (_dir, manager, _git) = manager();
    manager.create("b", "t1").await.unwrap();
    manager.lock("t1").unwrap();
    assert!(manager.get("t1").unwrap().locked);

    manager.unlock("t1");
    assert!(!manager.get("t1").unwrap().locked);
}

#[tokio::test]
async fn lock_requires_a_worktree_but_unlock_does_not() {
    let (_dir, manager, _git) = manager();
    assert!(matches!(manager.lock("t9"), Err(WorktreeError::NotFound(_))));
    // Hooks may have deleted the worktree already
    manager.unlock("t9");
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_dir, manager, _git) = manager();
    manager.create("b", "t1").await.unwrap();
    manager.delete("t1").await.unwrap();
    assert!(manager.get("t1").is_none());
    manager.delete("t1").await.unwrap();
}

#[tokio::test]
async fn list_and_cleanup() {
    let (_dir, manager, _git) = manager();
    manager.create("b1", "t1").await.unwrap();
    manager.create("b2", "t2").await.unwrap();

    let listed = manager.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].task_id, "t1");

    let removed = manager.cleanup().await.unwrap();
    assert_eq!(removed, 2);
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn registry_reuses_managers_per_project() {
    let dir = tempfile::tempdir().unwrap();
    let registry = WorktreeRegistry::new(dir.path().to_path_buf(), FakeGitOps::new());
    let p = project();

    let a = registry.for_project(&p);
    a.create("b", "t1").await.unwrap();
    let b = registry.for_project(&p);
    // Same manager: the worktree is visible through both handles
    assert!(b.get("t1").is_some());
}
