// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn status(name: &str, is_final: bool) -> StatusDef {
    StatusDef {
        name: name.to_string(),
        label: name.to_string(),
        color: None,
        is_final,
    }
}

fn dev_pipeline() -> Pipeline {
    Pipeline {
        id: "dev".to_string(),
        name: "Development".to_string(),
        task_type: "feature".to_string(),
        statuses: vec![
            status("open", false),
            status("implementing", false),
            status("pr_review", false),
            status("done", true),
        ],
        transitions: vec![
            Transition::new("open", "implementing", Trigger::Manual),
            Transition::new("implementing", "pr_review", Trigger::Agent).on_outcome("pr_ready"),
            Transition::new("implementing", "open", Trigger::Agent).on_outcome("failed"),
            Transition::new("pr_review", "done", Trigger::Manual),
            Transition::new("*", "open", Trigger::System),
        ],
        revision: String::new(),
    }
}

#[test]
fn status_lookup() {
    let p = dev_pipeline();
    assert!(p.has_status("open"));
    assert!(!p.has_status("archived"));
    assert!(p.is_final("done"));
    assert!(!p.is_final("open"));
    assert!(!p.is_final("missing"));
}

#[test]
fn transitions_from_includes_wildcard() {
    let p = dev_pipeline();
    let from_review = p.transitions_from("pr_review", None);
    assert_eq!(from_review.len(), 2); // pr_review→done and *→open
}

#[test]
fn transitions_from_filters_by_trigger() {
    let p = dev_pipeline();
    let manual = p.transitions_from("pr_review", Some(Trigger::Manual));
    assert_eq!(manual.len(), 1);
    assert_eq!(manual[0].to, "done");
}

#[test]
fn find_transition_by_trigger() {
    let p = dev_pipeline();
    let t = p.find_transition("open", "implementing", Trigger::Manual, None);
    assert!(t.is_some());

    // Wrong trigger finds nothing
    assert!(p
        .find_transition("open", "implementing", Trigger::System, None)
        .is_none());
}

#[test]
fn agent_transitions_discriminate_on_outcome() {
    let p = dev_pipeline();
    let t = p
        .find_transition("implementing", "pr_review", Trigger::Agent, Some("pr_ready"))
        .unwrap();
    assert_eq!(t.agent_outcome.as_deref(), Some("pr_ready"));

    assert!(p
        .find_transition("implementing", "pr_review", Trigger::Agent, Some("failed"))
        .is_none());
}

#[test]
fn exact_from_wins_over_wildcard() {
    let mut p = dev_pipeline();
    p.transitions
        .push(Transition::new("done", "open", Trigger::System));

    let t = p.find_transition("done", "open", Trigger::System, None).unwrap();
    assert_eq!(t.from, "done");

    // From a status with no exact arc, the wildcard matches
    let t = p.find_transition("pr_review", "open", Trigger::System, None).unwrap();
    assert_eq!(t.from, WILDCARD_FROM);
}

#[test]
fn find_agent_transition_routes_by_outcome() {
    let p = dev_pipeline();
    let t = p.find_agent_transition("implementing", "pr_ready").unwrap();
    assert_eq!(t.to, "pr_review");

    let t = p.find_agent_transition("implementing", "failed").unwrap();
    assert_eq!(t.to, "open");

    assert!(p.find_agent_transition("open", "pr_ready").is_none());
}

#[test]
fn hook_policy_defaults_to_best_effort() {
    let hook = HookRef::named("notify");
    assert_eq!(hook.policy, HookPolicy::BestEffort);

    let json = r#"{"name": "notify"}"#;
    let parsed: HookRef = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.policy, HookPolicy::BestEffort);
}

#[test]
fn trigger_serde_uses_snake_case() {
    assert_eq!(serde_json::to_string(&Trigger::Manual).unwrap(), "\"manual\"");
    assert_eq!(
        serde_json::to_string(&HookPolicy::FireAndForget).unwrap(),
        "\"fire_and_forget\""
    );
}
