// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in hooks.
//!
//! Hooks are async side effects run after a committed status change.
//! The built-ins capture their collaborators (adapters, the store,
//! the executor's request channel) in a [`HookEnv`] at registration
//! time, so the engine itself stays free of adapter types.

use crate::activity::ActivityLogger;
use crate::executor::ExecuteRequest;
use crate::registry::{HookFn, HookOutcome};
use crate::template::substitute;
use crate::transition::{FollowUpTransition, TransitionContext};
use crate::worktree::WorktreeRegistry;
use crate::PipelineEngine;
use crew_adapters::{CreatePrRequest, GitOps, NotifyAdapter, ScmPlatform};
use crew_core::{
    ArtifactKind, Clock, IdGen, PendingPrompt, PhaseStatus, PromptStatus, TaskArtifact,
};
use crew_storage::Store;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Collaborators captured by the built-in hooks.
#[derive(Clone)]
pub struct HookEnv<G, P, N, C, I>
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub store: Store,
    pub activity: ActivityLogger<C, I>,
    pub git: G,
    pub scm: P,
    pub notifier: N,
    pub worktrees: Arc<WorktreeRegistry<G>>,
    pub run_tx: mpsc::UnboundedSender<ExecuteRequest>,
    pub clock: C,
    pub id_gen: I,
}

fn param_str(params: Option<&Value>, key: &str) -> Option<String> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn data_str(data: Option<&Value>, key: &str) -> Option<String> {
    data.and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `start_agent{mode, agentType}`: enqueue an agent execution on the
/// executor's request channel. Declared `fire_and_forget` in pipelines.
pub fn start_agent<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let mode = match param_str(input.params.as_ref(), "mode") {
                Some(mode) => mode,
                // The review→implement arc picks its mode per project
                None if input.context.agent_outcome.as_deref() == Some("changes_requested") => env
                    .store
                    .project(&input.task.project_id)
                    .map(|p| p.config.request_changes_mode)
                    .unwrap_or_else(|| "request_changes".to_string()),
                None => "implement".to_string(),
            };
            let agent_type = param_str(input.params.as_ref(), "agentType")
                .unwrap_or_else(|| "claude".to_string());

            let request = ExecuteRequest {
                task_id: input.task.id.clone(),
                mode,
                agent_type,
            };
            match env.run_tx.send(request) {
                Ok(()) => HookOutcome::ok(),
                Err(_) => HookOutcome::failed("executor is not accepting runs"),
            }
        })
    })
}

/// `create_prompt{resumeOutcome?}`: materialize a [`PendingPrompt`]
/// from `context.data.payload`.
pub fn create_prompt<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let data = input.context.data.as_ref();
            let mut payload = data
                .and_then(|d| d.get("payload"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            if let Some(resume) = param_str(input.params.as_ref(), "resumeOutcome") {
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("resume_outcome".to_string(), json!(resume));
                }
            }

            let prompt = PendingPrompt {
                id: env.id_gen.next(),
                task_id: input.task.id.clone(),
                agent_run_id: data_str(data, "agentRunId").unwrap_or_default(),
                prompt_type: input
                    .context
                    .agent_outcome
                    .clone()
                    .unwrap_or_else(|| "question".to_string()),
                payload,
                response: None,
                status: PromptStatus::Pending,
                created_at_ms: env.clock.epoch_ms(),
                answered_at_ms: None,
            };

            match env.store.put_prompt(prompt) {
                Ok(()) => HookOutcome::ok(),
                Err(e) => HookOutcome::failed(format!("failed to persist prompt: {e}")),
            }
        })
    })
}

/// `notify{titleTemplate, bodyTemplate}`: desktop notification with
/// literal `{taskTitle}`, `{fromStatus}`, `{toStatus}` substitution.
pub fn notify<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let vars: Vec<(&str, String)> = vec![
                ("taskTitle", input.task.title.clone()),
                ("fromStatus", input.from_status.clone()),
                ("toStatus", input.task.status.clone()),
            ];
            let title = substitute(
                &param_str(input.params.as_ref(), "titleTemplate")
                    .unwrap_or_else(|| "{taskTitle}".to_string()),
                &vars,
            );
            let body = substitute(
                &param_str(input.params.as_ref(), "bodyTemplate")
                    .unwrap_or_else(|| "{fromStatus} → {toStatus}".to_string()),
                &vars,
            );

            match env.notifier.notify(&title, &body).await {
                Ok(()) => HookOutcome::ok(),
                Err(e) => HookOutcome::failed(format!("notification failed: {e}")),
            }
        })
    })
}

/// `push_and_create_pr`: push the task branch and open a PR. Declared
/// `required` in pipelines: failure rolls the transition back.
pub fn push_and_create_pr<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let task = &input.task;
            let Some(project) = env.store.project(&task.project_id) else {
                return HookOutcome::failed(format!("project '{}' not found", task.project_id));
            };
            let Some(branch) = task
                .branch_name
                .clone()
                .or_else(|| data_str(input.context.data.as_ref(), "branch"))
            else {
                return HookOutcome::failed("task has no branch to push");
            };

            if let Err(e) = env.git.push(&project.repo_path, &branch, false).await {
                return HookOutcome::failed(format!("push failed: {e}"));
            }

            let body = task
                .plan
                .clone()
                .unwrap_or_else(|| task.description.clone());
            let pr = match env
                .scm
                .create_pr(CreatePrRequest {
                    repo_path: project.repo_path.clone(),
                    branch: branch.clone(),
                    base: project.default_branch.clone(),
                    title: task.title.clone(),
                    body,
                })
                .await
            {
                Ok(pr) => pr,
                Err(e) => return HookOutcome::failed(e.to_string()),
            };

            let persisted = env.store.with_txn(|txn| {
                if let Some(mut fresh) = txn.task(&task.id) {
                    fresh.pr_link = Some(pr.url.clone());
                    fresh.updated_at_ms = env.clock.epoch_ms();
                    txn.put_task(fresh);
                }
                txn.append_artifact(TaskArtifact {
                    id: env.id_gen.next(),
                    task_id: task.id.clone(),
                    kind: ArtifactKind::Pr,
                    data: json!({ "url": pr.url, "branch": branch }),
                    created_at_ms: env.clock.epoch_ms(),
                });
            });
            if let Err(e) = persisted {
                return HookOutcome::failed(format!("failed to persist PR: {e}"));
            }

            env.activity.info(
                &task.id,
                "hook",
                format!("PR created: {}", pr.url),
                json!({ "url": pr.url }),
            );
            HookOutcome::ok()
        })
    })
}

/// `merge_pr`: merge the task's PR and delete its worktree. Declared
/// `required` in pipelines.
pub fn merge_pr<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let task = &input.task;
            let Some(project) = env.store.project(&task.project_id) else {
                return HookOutcome::failed(format!("project '{}' not found", task.project_id));
            };

            let pr_url = task.pr_link.clone().or_else(|| {
                env.store
                    .artifacts_for_task(&task.id)
                    .iter()
                    .rev()
                    .find(|a| a.kind == ArtifactKind::Pr)
                    .and_then(|a| a.data.get("url"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
            let Some(pr_url) = pr_url else {
                return HookOutcome::failed("task has no PR to merge");
            };

            if let Err(e) = env.scm.merge_pr(&project.repo_path, &pr_url).await {
                return HookOutcome::failed(e.to_string());
            }

            // The checkout has served its purpose once the PR lands.
            let manager = env.worktrees.for_project(&project);
            if let Err(e) = manager.delete(&task.id).await {
                env.activity.warning(
                    &task.id,
                    "worktree",
                    format!("worktree cleanup after merge failed: {e}"),
                    json!(null),
                );
            }

            env.activity.info(
                &task.id,
                "hook",
                format!("PR merged: {pr_url}"),
                json!({ "url": pr_url }),
            );
            HookOutcome::ok()
        })
    })
}

/// `advance_phase`: complete the current phase, activate the next,
/// clear the task's PR/branch, delete the worktree, and ask the engine
/// for a `system` transition back into the implement state.
pub fn advance_phase<G, P, N, C, I>(env: HookEnv<G, P, N, C, I>) -> HookFn
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    Arc::new(move |input| {
        let env = env.clone();
        Box::pin(async move {
            let task_id = input.task.id.clone();

            let advanced = env.store.with_txn(|txn| {
                let mut fresh = txn.task(&task_id)?;
                let completed = fresh
                    .active_phase()
                    .or_else(|| fresh.phases.iter().position(|p| p.status == PhaseStatus::Pending));
                if let Some(i) = completed {
                    fresh.phases[i].status = PhaseStatus::Completed;
                    fresh.phases[i].pr_link = fresh.pr_link.clone();
                }
                let next = fresh.next_pending_phase();
                if let Some(j) = next {
                    fresh.phases[j].status = PhaseStatus::InProgress;
                }
                fresh.pr_link = None;
                fresh.branch_name = None;
                fresh.updated_at_ms = env.clock.epoch_ms();
                txn.put_task(fresh);
                Some(next.is_some())
            });

            let has_next = match advanced {
                Ok(Some(has_next)) => has_next,
                Ok(None) => return HookOutcome::failed(format!("task '{task_id}' not found")),
                Err(e) => return HookOutcome::failed(format!("failed to advance phase: {e}")),
            };

            if let Some(project) = env.store.project(&input.task.project_id) {
                let manager = env.worktrees.for_project(&project);
                if let Err(e) = manager.delete(&task_id).await {
                    env.activity.warning(
                        &task_id,
                        "worktree",
                        format!("worktree cleanup on phase advance failed: {e}"),
                        json!(null),
                    );
                }
            }

            if !has_next {
                env.activity.info(&task_id, "phase", "all phases completed", json!(null));
                return HookOutcome::ok();
            }

            let to_status = param_str(input.params.as_ref(), "to")
                .unwrap_or_else(|| "implementing".to_string());
            env.activity.info(
                &task_id,
                "phase",
                format!("phase completed, next phase activated; returning to '{to_status}'"),
                json!(null),
            );
            HookOutcome::ok_with_follow_up(FollowUpTransition {
                to_status,
                context: TransitionContext::system(),
            })
        })
    })
}

/// Register every built-in hook on the engine.
pub fn register_builtins<G, P, N, C, I>(engine: &PipelineEngine<C, I>, env: HookEnv<G, P, N, C, I>)
where
    G: GitOps,
    P: ScmPlatform,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    engine.register_hook("start_agent", start_agent(env.clone()));
    engine.register_hook("create_prompt", create_prompt(env.clone()));
    engine.register_hook("notify", notify(env.clone()));
    engine.register_hook("push_and_create_pr", push_and_create_pr(env.clone()));
    engine.register_hook("merge_pr", merge_pr(env.clone()));
    engine.register_hook("advance_phase", advance_phase(env));
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
