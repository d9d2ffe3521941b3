// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subtask reconciliation from intercepted agent tool calls.
//!
//! The executor watches `TodoWrite`, `TaskCreate`, and `TaskUpdate`
//! tool uses in the agent stream and mirrors their progress onto the
//! task's effective subtask list (phase-local when multi-phase).

use crew_core::{SubtaskStatus, Task};
use serde_json::Value;
use std::collections::HashMap;

/// Map of SDK-side task id → subtask name, maintained per run.
#[derive(Debug, Default)]
pub struct SdkTaskMap {
    names: HashMap<String, String>,
}

impl SdkTaskMap {
    pub fn record(&mut self, sdk_id: &str, name: &str) {
        self.names.insert(sdk_id.to_string(), name.to_string());
    }

    pub fn name_for(&self, sdk_id: &str) -> Option<&str> {
        self.names.get(sdk_id).map(String::as_str)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn map_status(status: &str) -> Option<SubtaskStatus> {
    match status {
        "pending" | "open" => Some(SubtaskStatus::Open),
        "in_progress" => Some(SubtaskStatus::InProgress),
        "completed" | "done" => Some(SubtaskStatus::Done),
        _ => None,
    }
}

/// Extract `(content, status)` pairs from a `TodoWrite` input.
pub fn parse_todos(input: &Value) -> Vec<(String, String)> {
    input
        .get("todos")
        .and_then(Value::as_array)
        .map(|todos| {
            todos
                .iter()
                .filter_map(|todo| {
                    let content = todo
                        .get("content")
                        .or_else(|| todo.get("subject"))
                        .and_then(Value::as_str)?;
                    let status = todo.get("status").and_then(Value::as_str).unwrap_or("pending");
                    Some((content.to_string(), status.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Match todos against the effective subtask set by case-folded,
/// trimmed name and update statuses. Returns true when anything
/// changed.
pub fn reconcile_todos(task: &mut Task, todos: &[(String, String)]) -> bool {
    let mut changed = false;
    let subtasks = task.effective_subtasks_mut();
    for (content, status) in todos {
        let Some(new_status) = map_status(status) else {
            continue;
        };
        let wanted = normalize(content);
        for subtask in subtasks.iter_mut() {
            if normalize(&subtask.name) == wanted && subtask.status != new_status {
                subtask.status = new_status;
                changed = true;
            }
        }
    }
    changed
}

/// Handle a `TaskCreate` tool use: remember which SDK task id maps to
/// which subtask name.
pub fn apply_task_create(map: &mut SdkTaskMap, input: &Value, result_id: Option<&str>) {
    let Some(subject) = input
        .get("subject")
        .or_else(|| input.get("content"))
        .and_then(Value::as_str)
    else {
        return;
    };
    // The SDK id comes back in the tool result when available; fall
    // back to the subject itself as the key.
    let sdk_id = result_id.unwrap_or(subject);
    map.record(sdk_id, subject);
}

/// Handle a `TaskUpdate` tool use, keyed through the per-run map.
/// Returns true when a subtask changed.
pub fn apply_task_update(task: &mut Task, map: &SdkTaskMap, input: &Value) -> bool {
    let Some(sdk_id) = input
        .get("taskId")
        .or_else(|| input.get("task_id"))
        .and_then(Value::as_str)
    else {
        return false;
    };
    let Some(status) = input.get("status").and_then(Value::as_str) else {
        return false;
    };
    let Some(name) = map.name_for(sdk_id) else {
        return false;
    };
    let name = name.to_string();
    reconcile_todos(task, &[(name, status.to_string())])
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
