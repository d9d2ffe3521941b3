// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan and summary extraction from agent output.
//!
//! Structured output is preferred; free-text output parsing is the
//! fallback for agents that do not shape their result.

use crew_core::{ImplementationPhase, PhaseStatus, Subtask, SubtaskStatus, Task};
use serde_json::Value;

/// What a planning-mode run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutput {
    pub plan: Option<String>,
    pub subtasks: Vec<String>,
    /// `(name, subtasks)` per phase; only installed when ≥ 2
    pub phases: Vec<(String, Vec<String>)>,
}

fn string_items(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj
                        .get("name")
                        .or_else(|| obj.get("content"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract a plan from structured output, falling back to parsing the
/// raw output text.
pub fn extract_plan(structured: Option<&Value>, output: &str) -> PlanOutput {
    if let Some(Value::Object(obj)) = structured {
        let provided = obj.contains_key("plan")
            || obj.contains_key("subtasks")
            || obj.contains_key("phases");
        if provided {
            let plan = obj
                .get("plan")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(output.to_string()).filter(|s| !s.is_empty()));
            let subtasks = obj.get("subtasks").map(string_items).unwrap_or_default();
            let phases = obj
                .get("phases")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|phase| {
                            let name = phase.get("name").and_then(Value::as_str)?;
                            let subtasks = phase
                                .get("subtasks")
                                .map(string_items)
                                .unwrap_or_default();
                            Some((name.to_string(), subtasks))
                        })
                        .collect()
                })
                .unwrap_or_default();
            return PlanOutput {
                plan,
                subtasks,
                phases,
            };
        }
    }

    // Fallback: the whole output is the plan, checklist bullets are
    // subtasks.
    let subtasks = output
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- [ ] ")
                .or_else(|| trimmed.strip_prefix("- [x] "))
                .map(str::to_string)
        })
        .collect();
    PlanOutput {
        plan: Some(output.to_string()).filter(|s| !s.is_empty()),
        subtasks,
        phases: Vec::new(),
    }
}

/// Install a plan on the task.
///
/// During a revision, existing subtasks are only overwritten when none
/// have started. Multi-phase plans (≥ 2 phases) install phases and
/// clear the flat subtask list.
pub fn apply_plan_to_task(task: &mut Task, plan: PlanOutput, revision: bool) {
    if let Some(text) = plan.plan {
        task.plan = Some(text);
    }

    if plan.phases.len() >= 2 {
        task.phases = plan
            .phases
            .into_iter()
            .enumerate()
            .map(|(i, (name, subtasks))| ImplementationPhase {
                id: format!("phase-{}", i + 1),
                name,
                status: PhaseStatus::Pending,
                subtasks: subtasks.into_iter().map(Subtask::open).collect(),
                pr_link: None,
            })
            .collect();
        task.subtasks.clear();
        return;
    }

    if plan.subtasks.is_empty() {
        return;
    }
    let any_started = task
        .subtasks
        .iter()
        .any(|s| s.status != SubtaskStatus::Open);
    if revision && any_started {
        return;
    }
    task.subtasks = plan.subtasks.into_iter().map(Subtask::open).collect();
}

/// The "## Summary" section of the output, or a trailing excerpt when
/// the agent never wrote one.
pub fn summary_of(output: &str) -> String {
    if let Some(idx) = output.rfind("## Summary") {
        let section = output[idx + "## Summary".len()..].trim();
        if !section.is_empty() {
            return section.to_string();
        }
    }
    let tail: String = output.chars().rev().take(500).collect();
    tail.chars().rev().collect::<String>().trim().to_string()
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
