// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crew_core::Task;
use serde_json::json;

#[test]
fn structured_plan_is_preferred() {
    let structured = json!({
        "plan": "1. parse\n2. store",
        "subtasks": ["parse", "store"],
    });
    let plan = extract_plan(Some(&structured), "ignored free text");
    assert_eq!(plan.plan.as_deref(), Some("1. parse\n2. store"));
    assert_eq!(plan.subtasks, ["parse", "store"]);
    assert!(plan.phases.is_empty());
}

#[test]
fn subtask_objects_with_names_work() {
    let structured = json!({ "subtasks": [{ "name": "a" }, { "content": "b" }, 42] });
    let plan = extract_plan(Some(&structured), "");
    assert_eq!(plan.subtasks, ["a", "b"]);
}

#[test]
fn output_parsing_is_the_fallback() {
    let output = "Here is the plan:\n- [ ] write code\n- [x] read spec\nDone.";
    let plan = extract_plan(None, output);
    assert_eq!(plan.plan.as_deref(), Some(output));
    assert_eq!(plan.subtasks, ["write code", "read spec"]);
}

#[test]
fn empty_structured_object_falls_back_to_output() {
    let plan = extract_plan(Some(&json!({})), "- [ ] only bullet");
    assert_eq!(plan.subtasks, ["only bullet"]);
}

#[test]
fn phases_extract_with_their_subtasks() {
    let structured = json!({
        "plan": "two phases",
        "phases": [
            { "name": "Backend", "subtasks": ["api"] },
            { "name": "Frontend", "subtasks": ["ui", "css"] },
        ],
    });
    let plan = extract_plan(Some(&structured), "");
    assert_eq!(plan.phases.len(), 2);
    assert_eq!(plan.phases[1].0, "Frontend");
    assert_eq!(plan.phases[1].1, ["ui", "css"]);
}

#[test]
fn applying_multi_phase_plan_clears_flat_subtasks() {
    let mut task = Task::builder()
        .subtask("old", crew_core::SubtaskStatus::Open)
        .build();
    let plan = PlanOutput {
        plan: Some("p".to_string()),
        subtasks: vec!["ignored".to_string()],
        phases: vec![
            ("One".to_string(), vec!["a".to_string()]),
            ("Two".to_string(), vec![]),
        ],
    };
    apply_plan_to_task(&mut task, plan, false);

    assert!(task.subtasks.is_empty());
    assert_eq!(task.phases.len(), 2);
    assert_eq!(task.phases[0].id, "phase-1");
    assert_eq!(task.phases[0].subtasks[0].name, "a");
    assert_eq!(task.phases[0].status, crew_core::PhaseStatus::Pending);
    assert!(task.phase_invariants_hold());
}

#[test]
fn single_phase_plans_stay_flat() {
    let mut task = Task::builder().build();
    let plan = PlanOutput {
        plan: None,
        subtasks: vec!["a".to_string()],
        phases: vec![("Only".to_string(), vec![])],
    };
    apply_plan_to_task(&mut task, plan, false);
    assert!(task.phases.is_empty());
    assert_eq!(task.subtasks.len(), 1);
}

#[test]
fn revision_keeps_started_subtasks() {
    let mut task = Task::builder()
        .subtask("started", crew_core::SubtaskStatus::InProgress)
        .build();
    let plan = PlanOutput {
        plan: Some("revised".to_string()),
        subtasks: vec!["replacement".to_string()],
        phases: vec![],
    };
    apply_plan_to_task(&mut task, plan, true);

    assert_eq!(task.plan.as_deref(), Some("revised"));
    assert_eq!(task.subtasks[0].name, "started");
}

#[test]
fn revision_overwrites_untouched_subtasks() {
    let mut task = Task::builder()
        .subtask("old", crew_core::SubtaskStatus::Open)
        .build();
    let plan = PlanOutput {
        plan: None,
        subtasks: vec!["new".to_string()],
        phases: vec![],
    };
    apply_plan_to_task(&mut task, plan, true);
    assert_eq!(task.subtasks[0].name, "new");
}

#[test]
fn summary_extracts_the_summary_section() {
    let output = "lots of work...\n## Summary\nAdded search over tasks.";
    assert_eq!(summary_of(output), "Added search over tasks.");
}

#[test]
fn summary_falls_back_to_the_tail() {
    let output = "no summary heading here";
    assert_eq!(summary_of(output), "no summary heading here");
}
