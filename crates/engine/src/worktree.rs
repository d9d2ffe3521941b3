// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task git worktree lifecycle.
//!
//! Each project gets a manager; each task gets at most one isolated
//! checkout at a time. The lock is cooperative: it sets a flag other
//! callers are expected to respect, it does not block `create` or
//! `delete`.

use crew_adapters::{GitError, GitOps};
use crew_core::Project;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from worktree operations
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("worktree already exists for task {0}")]
    AlreadyExists(String),
    #[error("no worktree for task {0}")]
    NotFound(String),
    #[error("git error: {0}")]
    Git(#[from] GitError),
}

/// An isolated checkout owned by a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub path: PathBuf,
    pub branch: String,
    pub task_id: String,
    pub locked: bool,
}

/// Manages the worktrees of one project.
pub struct WorktreeManager<G: GitOps> {
    repo_path: PathBuf,
    default_branch: String,
    /// Directory worktrees are created under
    root: PathBuf,
    git: G,
    entries: Mutex<HashMap<String, Worktree>>,
}

impl<G: GitOps> WorktreeManager<G> {
    pub fn new(project: &Project, root: PathBuf, git: G) -> Self {
        Self {
            repo_path: project.repo_path.clone(),
            default_branch: project.default_branch.clone(),
            root,
            git,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a worktree for `task_id` on a new `branch`. Fails when
    /// the task already has one.
    pub async fn create(&self, branch: &str, task_id: &str) -> Result<Worktree, WorktreeError> {
        if self.entries.lock().contains_key(task_id) {
            return Err(WorktreeError::AlreadyExists(task_id.to_string()));
        }

        let path = self.root.join(task_id);
        let start_point = format!("origin/{}", self.default_branch);
        self.git
            .worktree_add(&self.repo_path, &path, branch, &start_point)
            .await?;

        let worktree = Worktree {
            path,
            branch: branch.to_string(),
            task_id: task_id.to_string(),
            locked: false,
        };
        self.entries
            .lock()
            .insert(task_id.to_string(), worktree.clone());
        tracing::info!(task_id, branch, "worktree created");
        Ok(worktree)
    }

    pub fn get(&self, task_id: &str) -> Option<Worktree> {
        self.entries.lock().get(task_id).cloned()
    }

    /// Set the cooperative lock flag.
    pub fn lock(&self, task_id: &str) -> Result<(), WorktreeError> {
        let mut entries = self.entries.lock();
        let worktree = entries
            .get_mut(task_id)
            .ok_or_else(|| WorktreeError::NotFound(task_id.to_string()))?;
        worktree.locked = true;
        Ok(())
    }

    /// Clear the cooperative lock flag. A no-op when the worktree is
    /// already gone, since hooks may have deleted it first.
    pub fn unlock(&self, task_id: &str) {
        if let Some(worktree) = self.entries.lock().get_mut(task_id) {
            worktree.locked = false;
        }
    }

    /// Remove the task's worktree. Idempotent with respect to
    /// already-absent worktrees.
    pub async fn delete(&self, task_id: &str) -> Result<(), WorktreeError> {
        let Some(worktree) = self.entries.lock().remove(task_id) else {
            return Ok(());
        };
        self.git
            .worktree_remove(&self.repo_path, &worktree.path)
            .await?;
        tracing::info!(task_id, "worktree deleted");
        Ok(())
    }

    pub fn list(&self) -> Vec<Worktree> {
        let mut worktrees: Vec<_> = self.entries.lock().values().cloned().collect();
        worktrees.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        worktrees
    }

    /// Delete every worktree this manager knows about. Returns how
    /// many were removed.
    pub async fn cleanup(&self) -> Result<usize, WorktreeError> {
        let task_ids: Vec<String> = self.entries.lock().keys().cloned().collect();
        let count = task_ids.len();
        for task_id in task_ids {
            self.delete(&task_id).await?;
        }
        Ok(count)
    }
}

/// Per-project factory for worktree managers.
pub struct WorktreeRegistry<G: GitOps> {
    root: PathBuf,
    git: G,
    managers: Mutex<HashMap<String, Arc<WorktreeManager<G>>>>,
}

impl<G: GitOps> WorktreeRegistry<G> {
    pub fn new(root: PathBuf, git: G) -> Self {
        Self {
            root,
            git,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the manager for a project.
    pub fn for_project(&self, project: &Project) -> Arc<WorktreeManager<G>> {
        let mut managers = self.managers.lock();
        managers
            .entry(project.id.clone())
            .or_insert_with(|| {
                Arc::new(WorktreeManager::new(
                    project,
                    self.root.join(&project.id),
                    self.git.clone(),
                ))
            })
            .clone()
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
