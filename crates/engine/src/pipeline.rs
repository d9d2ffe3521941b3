// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline engine: data-driven state machine evaluation.
//!
//! `execute_transition` is the central operation. Guards run inside a
//! synchronous store transaction so they serialize with concurrent
//! status changes; hooks run after commit because they perform I/O and
//! must not hold the write lock; a failed `required` hook compensates
//! by restoring the pre-transition status.

use crate::activity::ActivityLogger;
use crate::error::EngineError;
use crate::registry::{GuardDecision, GuardFn, GuardRegistry, HookFn, HookInput, HookOutcome, HookRegistry};
use crate::transition::{
    FollowUpTransition, GuardCheck, GuardFailure, HookFailure, HookRetryResult, TransitionContext,
    TransitionOutcome,
};
use crew_core::{
    Clock, GuardResult, HookPolicy, IdGen, Pipeline, Task, Transition, TransitionRecord, Trigger,
};
use crew_storage::Store;
use serde_json::json;
use std::collections::VecDeque;

/// Transitions leaving a status, grouped by trigger.
#[derive(Debug, Clone, Default)]
pub struct TransitionGroups {
    pub manual: Vec<Transition>,
    pub agent: Vec<Transition>,
    pub system: Vec<Transition>,
}

/// What the transactional phase of a transition decided.
enum TxnVerdict {
    TaskDisappeared,
    ConcurrentModification { persisted: String },
    GuardsBlocked { results: Vec<GuardResult> },
    Committed { prev_status: String, updated: Task },
}

/// The state machine evaluator. Borrows tasks; never owns them.
pub struct PipelineEngine<C: Clock, I: IdGen> {
    store: Store,
    clock: C,
    id_gen: I,
    guards: GuardRegistry,
    hooks: HookRegistry,
    activity: ActivityLogger<C, I>,
}

impl<C: Clock, I: IdGen> PipelineEngine<C, I> {
    pub fn new(store: Store, clock: C, id_gen: I) -> Self {
        let activity = ActivityLogger::new(store.clone(), clock.clone(), id_gen.clone());
        Self {
            store,
            clock,
            id_gen,
            guards: GuardRegistry::new(),
            hooks: HookRegistry::new(),
            activity,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLogger<C, I> {
        &self.activity
    }

    /// Register a guard under `name`. Last registration wins.
    pub fn register_guard(&self, name: &str, guard: GuardFn) {
        self.guards.register(name, guard);
    }

    /// Register a hook under `name`. Last registration wins.
    pub fn register_hook(&self, name: &str, hook: HookFn) {
        self.hooks.register(name, hook);
    }

    fn pipeline_for(&self, task: &Task) -> Result<Pipeline, EngineError> {
        self.store
            .pipeline(&task.pipeline_id)
            .ok_or_else(|| EngineError::PipelineNotFound(task.pipeline_id.clone()))
    }

    /// Transitions leaving the task's current status, optionally
    /// filtered by trigger.
    pub fn valid_transitions(
        &self,
        task: &Task,
        trigger: Option<Trigger>,
    ) -> Result<Vec<Transition>, EngineError> {
        let pipeline = self.pipeline_for(task)?;
        Ok(pipeline
            .transitions_from(&task.status, trigger)
            .into_iter()
            .cloned()
            .collect())
    }

    /// All transitions leaving the task's current status, grouped by
    /// trigger.
    pub fn all_transitions(&self, task: &Task) -> Result<TransitionGroups, EngineError> {
        let mut groups = TransitionGroups::default();
        for transition in self.valid_transitions(task, None)? {
            match transition.trigger {
                Trigger::Manual => groups.manual.push(transition),
                Trigger::Agent => groups.agent.push(transition),
                Trigger::System => groups.system.push(transition),
            }
        }
        Ok(groups)
    }

    /// Dry-run the guards of the matching transition without mutating
    /// anything. `None` when no transition matches.
    pub fn check_guards(
        &self,
        task: &Task,
        to_status: &str,
        context: &TransitionContext,
    ) -> Result<Option<GuardCheck>, EngineError> {
        let pipeline = self.pipeline_for(task)?;
        let Some(transition) = pipeline
            .find_transition(
                &task.status,
                to_status,
                context.trigger,
                context.agent_outcome.as_deref(),
            )
            .cloned()
        else {
            return Ok(None);
        };

        let results = self.store.with_txn(|txn| {
            let fresh = txn.task(&task.id).unwrap_or_else(|| task.clone());
            self.run_guards(&fresh, &transition, context, txn.state())
        })?;

        Ok(Some(GuardCheck {
            allowed: results.iter().all(|r| r.allowed),
            results,
        }))
    }

    fn run_guards(
        &self,
        task: &Task,
        transition: &Transition,
        context: &TransitionContext,
        state: &crew_storage::StoreState,
    ) -> Vec<GuardResult> {
        transition
            .guards
            .iter()
            .map(|guard_ref| {
                let decision = match self.guards.get(&guard_ref.name) {
                    Some(guard) => guard(task, transition, context, state, guard_ref.params.as_ref()),
                    None => GuardDecision::block("unregistered"),
                };
                GuardResult {
                    guard: guard_ref.name.clone(),
                    allowed: decision.allowed,
                    reason: decision.reason,
                }
            })
            .collect()
    }

    /// Execute a transition: transactional guard pass + status commit,
    /// then post-commit hooks, then any follow-up transitions hooks
    /// asked for.
    pub async fn execute_transition(
        &self,
        task: &Task,
        to_status: &str,
        context: TransitionContext,
    ) -> Result<TransitionOutcome, EngineError> {
        let (outcome, follow_ups) = self.execute_impl(task, to_status, context, false).await?;
        self.drain_follow_ups(&task.id, follow_ups).await?;
        Ok(outcome)
    }

    /// Like `execute_transition` but guards are bypassed. The target
    /// status must still exist; hooks still run when a matching
    /// transition exists.
    pub async fn execute_force_transition(
        &self,
        task: &Task,
        to_status: &str,
        context: TransitionContext,
    ) -> Result<TransitionOutcome, EngineError> {
        let (outcome, follow_ups) = self.execute_impl(task, to_status, context, true).await?;
        self.drain_follow_ups(&task.id, follow_ups).await?;
        Ok(outcome)
    }

    /// Route an agent outcome through the pipeline: find the
    /// agent-trigger transition for `(task.status, outcome)` and run it.
    pub async fn execute_agent_outcome(
        &self,
        task: &Task,
        outcome: &str,
        data: serde_json::Value,
    ) -> Result<TransitionOutcome, EngineError> {
        let pipeline = self.pipeline_for(task)?;
        let Some(transition) = pipeline.find_agent_transition(&task.status, outcome) else {
            self.activity.info(
                &task.id,
                "transition",
                format!(
                    "no agent transition for outcome '{outcome}' from '{}'",
                    task.status
                ),
                json!(null),
            );
            return Ok(TransitionOutcome::failed(format!(
                "no transition for outcome '{outcome}' from '{}'",
                task.status
            )));
        };
        let to_status = transition.to.clone();
        self.execute_transition(task, &to_status, TransitionContext::agent(outcome, data))
            .await
    }

    /// Re-invoke a single hook of a transition out-of-band. Does not
    /// change status; any follow-up request the hook returns is
    /// ignored.
    pub async fn retry_hook(
        &self,
        task: &Task,
        hook_name: &str,
        transition: &Transition,
        context: TransitionContext,
    ) -> HookRetryResult {
        let Some(hook_ref) = transition.hooks.iter().find(|h| h.name == hook_name) else {
            return HookRetryResult {
                success: false,
                error: Some(format!("transition has no hook '{hook_name}'")),
            };
        };
        let Some(hook) = self.hooks.get(hook_name) else {
            return HookRetryResult {
                success: false,
                error: Some(format!("hook '{hook_name}' is not registered")),
            };
        };

        let outcome = hook(HookInput {
            task: task.clone(),
            transition: transition.clone(),
            from_status: task.status.clone(),
            context,
            params: hook_ref.params.clone(),
        })
        .await;

        self.activity.info(
            &task.id,
            "hook",
            format!(
                "hook '{hook_name}' retried: {}",
                if outcome.success { "ok" } else { "failed" }
            ),
            json!({ "error": outcome.error }),
        );

        HookRetryResult {
            success: outcome.success,
            error: outcome.error,
        }
    }

    /// Run follow-up transitions until the queue drains. Each runs
    /// against the freshest task row; refusals are logged, never
    /// propagated.
    async fn drain_follow_ups(
        &self,
        task_id: &str,
        follow_ups: Vec<FollowUpTransition>,
    ) -> Result<(), EngineError> {
        let mut queue: VecDeque<FollowUpTransition> = follow_ups.into();
        while let Some(follow_up) = queue.pop_front() {
            let Some(fresh) = self.store.task(task_id) else {
                break;
            };
            let (result, more) = self
                .execute_impl(&fresh, &follow_up.to_status, follow_up.context, false)
                .await?;
            if !result.success {
                self.activity.warning(
                    task_id,
                    "transition",
                    format!(
                        "follow-up transition to '{}' did not run: {}",
                        follow_up.to_status,
                        result.error.unwrap_or_else(|| "blocked by guards".to_string())
                    ),
                    json!(null),
                );
            }
            queue.extend(more);
        }
        Ok(())
    }

    async fn execute_impl(
        &self,
        task: &Task,
        to_status: &str,
        context: TransitionContext,
        force: bool,
    ) -> Result<(TransitionOutcome, Vec<FollowUpTransition>), EngineError> {
        let pipeline = self.pipeline_for(task)?;

        if !pipeline.has_status(to_status) {
            return Ok((
                TransitionOutcome::failed(format!(
                    "status '{to_status}' is not defined by pipeline '{}'",
                    pipeline.id
                )),
                Vec::new(),
            ));
        }

        let transition = pipeline
            .find_transition(
                &task.status,
                to_status,
                context.trigger,
                context.agent_outcome.as_deref(),
            )
            .cloned();

        if transition.is_none() && !force {
            return Ok((
                TransitionOutcome::failed(format!(
                    "no transition from '{}' to '{to_status}' ({})",
                    task.status, context.trigger
                )),
                Vec::new(),
            ));
        }

        tracing::info!(
            task_id = %task.id,
            from = %task.status,
            to = %to_status,
            trigger = %context.trigger,
            force,
            "executing transition"
        );

        // Phase 1: guards + status update, atomically. The re-read
        // serializes concurrent transitions on the same task: the
        // loser sees a status it did not expect.
        let verdict = self.store.with_txn(|txn| {
            let Some(fresh) = txn.task(&task.id) else {
                return TxnVerdict::TaskDisappeared;
            };
            if fresh.status != task.status {
                return TxnVerdict::ConcurrentModification {
                    persisted: fresh.status.clone(),
                };
            }

            let results = match (&transition, force) {
                (Some(t), false) => self.run_guards(&fresh, t, &context, txn.state()),
                _ => Vec::new(),
            };
            if results.iter().any(|r| !r.allowed) {
                return TxnVerdict::GuardsBlocked { results };
            }

            let mut updated = fresh;
            let prev_status = updated.status.clone();
            updated.status = to_status.to_string();
            updated.updated_at_ms = self.clock.epoch_ms();
            txn.put_task(updated.clone());
            txn.append_history(TransitionRecord {
                id: self.id_gen.next(),
                task_id: updated.id.clone(),
                from_status: prev_status.clone(),
                to_status: to_status.to_string(),
                trigger: context.trigger,
                actor: context.actor.clone(),
                guard_results: results,
                created_at_ms: self.clock.epoch_ms(),
            });
            TxnVerdict::Committed {
                prev_status,
                updated,
            }
        })?;

        let (prev_status, updated) = match verdict {
            TxnVerdict::TaskDisappeared => {
                return Ok((
                    TransitionOutcome::failed(format!("task '{}' no longer exists", task.id)),
                    Vec::new(),
                ));
            }
            TxnVerdict::ConcurrentModification { persisted } => {
                return Ok((
                    TransitionOutcome::failed(format!(
                        "concurrent modification: task is now '{persisted}', expected '{}'",
                        task.status
                    )),
                    Vec::new(),
                ));
            }
            TxnVerdict::GuardsBlocked { results } => {
                let failures: Vec<GuardFailure> = results
                    .iter()
                    .filter(|r| !r.allowed)
                    .map(|r| GuardFailure {
                        guard: r.guard.clone(),
                        reason: r.reason.clone().unwrap_or_else(|| "blocked".to_string()),
                    })
                    .collect();
                let names: Vec<&str> = failures.iter().map(|f| f.guard.as_str()).collect();
                self.activity.warning(
                    &task.id,
                    "guard",
                    format!(
                        "transition {} → {to_status} blocked by guards: {}",
                        task.status,
                        names.join(", ")
                    ),
                    json!({ "failures": failures
                        .iter()
                        .map(|f| json!({ "guard": f.guard, "reason": f.reason }))
                        .collect::<Vec<_>>() }),
                );
                return Ok((TransitionOutcome::blocked(failures), Vec::new()));
            }
            TxnVerdict::Committed {
                prev_status,
                updated,
            } => (prev_status, updated),
        };

        // Phase 2: hooks, outside the transaction.
        let (hook_failures, rollback_failure, follow_ups) = match &transition {
            Some(t) => self.run_hooks(t, &updated, &prev_status, &context).await,
            None => (Vec::new(), None, Vec::new()),
        };

        // Phase 3: compensate when a required hook failed.
        if let Some(failure) = rollback_failure {
            self.store.with_txn(|txn| {
                if let Some(mut current) = txn.task(&updated.id) {
                    current.status = prev_status.clone();
                    current.updated_at_ms = self.clock.epoch_ms();
                    txn.put_task(current);
                }
            })?;
            let error = format!("{}: {}", failure.hook, failure.error);
            self.activity.error(
                &updated.id,
                "hook",
                format!("transition rolled back to '{prev_status}': {error}"),
                json!({ "hook": failure.hook, "policy": failure.policy.to_string() }),
            );
            let mut all_failures = hook_failures;
            all_failures.push(failure);
            return Ok((
                TransitionOutcome {
                    success: false,
                    task: None,
                    error: Some(error),
                    guard_failures: Vec::new(),
                    hook_failures: all_failures,
                },
                Vec::new(),
            ));
        }

        self.activity.info(
            &updated.id,
            "transition",
            format!("status: {prev_status} → {to_status} ({})", context.trigger),
            json!({
                "from": prev_status,
                "to": to_status,
                "trigger": context.trigger.to_string(),
                "actor": context.actor,
            }),
        );

        // Hooks may have mutated the task; return the freshest row.
        let task_after = self.store.task(&updated.id).unwrap_or(updated);
        Ok((
            TransitionOutcome {
                success: true,
                task: Some(task_after),
                error: None,
                guard_failures: Vec::new(),
                hook_failures,
            },
            follow_ups,
        ))
    }

    /// Run a transition's hooks in declared order under their policies.
    /// Returns `(best_effort_failures, required_failure, follow_ups)`.
    /// The hook pass stops at a failed `required` hook: the commit is
    /// about to be rolled back, so later hooks must not fire.
    async fn run_hooks(
        &self,
        transition: &Transition,
        task: &Task,
        from_status: &str,
        context: &TransitionContext,
    ) -> (Vec<HookFailure>, Option<HookFailure>, Vec<FollowUpTransition>) {
        let mut failures = Vec::new();
        let mut follow_ups = Vec::new();

        for hook_ref in &transition.hooks {
            let input = HookInput {
                task: task.clone(),
                transition: transition.clone(),
                from_status: from_status.to_string(),
                context: context.clone(),
                params: hook_ref.params.clone(),
            };

            match hook_ref.policy {
                HookPolicy::FireAndForget => match self.hooks.get(&hook_ref.name) {
                    Some(hook) => {
                        let activity = self.activity.clone();
                        let name = hook_ref.name.clone();
                        let task_id = task.id.clone();
                        let future = hook(input);
                        tokio::spawn(async move {
                            let outcome = future.await;
                            if !outcome.success {
                                activity.error(
                                    &task_id,
                                    "hook",
                                    format!(
                                        "hook '{name}' failed: {}",
                                        outcome.error.unwrap_or_else(|| "unknown".to_string())
                                    ),
                                    json!(null),
                                );
                            }
                        });
                    }
                    None => {
                        self.activity.error(
                            &task.id,
                            "hook",
                            format!("hook '{}' is not registered", hook_ref.name),
                            json!(null),
                        );
                    }
                },
                HookPolicy::BestEffort | HookPolicy::Required => {
                    let outcome = match self.hooks.get(&hook_ref.name) {
                        Some(hook) => hook(input).await,
                        None => {
                            HookOutcome::failed(format!("hook '{}' is not registered", hook_ref.name))
                        }
                    };
                    if let Some(follow_up) = outcome.follow_up {
                        follow_ups.push(follow_up);
                    }
                    if !outcome.success {
                        let failure = HookFailure {
                            hook: hook_ref.name.clone(),
                            policy: hook_ref.policy,
                            error: outcome.error.unwrap_or_else(|| "hook failed".to_string()),
                        };
                        if hook_ref.policy == HookPolicy::Required {
                            return (failures, Some(failure), follow_ups);
                        }
                        self.activity.warning(
                            &task.id,
                            "hook",
                            format!("hook '{}' failed: {}", failure.hook, failure.error),
                            json!(null),
                        );
                        failures.push(failure);
                    }
                }
            }
        }

        (failures, None, follow_ups)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
