//! Manual transitions through the facade.

use crate::prelude::*;
use crew_core::{HookRef, Severity, Transition, Trigger};

fn two_state_pipeline() -> crew_core::Pipeline {
    pipeline(
        vec![status("open", false), status("in_progress", false)],
        vec![
            Transition::new("open", "in_progress", Trigger::Manual).hook(HookRef::named("notify")),
        ],
    )
}

#[tokio::test]
async fn happy_transition_with_best_effort_hook() {
    let h = harness();
    h.workflow.add_pipeline(two_state_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "open")).unwrap();

    let result = h
        .workflow
        .transition("t1", "in_progress", Some("alice"))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.hook_failures.is_empty());
    assert_eq!(result.task.unwrap().status, "in_progress");
    assert_eq!(h.workflow.task("t1").unwrap().status, "in_progress");

    // Exactly one status_change event
    let events = h.workflow.task_events("t1");
    let status_changes: Vec<_> = events
        .iter()
        .filter(|e| e.category == "transition" && e.severity == Severity::Info)
        .collect();
    assert_eq!(status_changes.len(), 1);
    assert!(status_changes[0].message.contains("open → in_progress"));

    // Exactly one history row
    let history = h.workflow.store().history_for_task("t1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, "open");
    assert_eq!(history[0].to_status, "in_progress");
    assert_eq!(history[0].trigger, Trigger::Manual);
    assert_eq!(history[0].actor.as_deref(), Some("alice"));

    // The notification went out
    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "Add full-text search");
    assert_eq!(calls[0].message, "open → in_progress");
}

#[tokio::test]
async fn transition_to_an_unknown_arc_is_refused() {
    let h = harness();
    h.workflow.add_pipeline(two_state_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "in_progress")).unwrap();

    let result = h.workflow.transition("t1", "open", None).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("no transition"));
    assert_eq!(h.workflow.task("t1").unwrap().status, "in_progress");
}

#[tokio::test]
async fn force_transition_skips_guards_but_not_status_checks() {
    let h = harness();
    h.workflow.add_pipeline(two_state_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "in_progress")).unwrap();

    // No arc in_progress → open exists, force still moves the task
    let result = h
        .workflow
        .force_transition("t1", "open", Some("admin"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(h.workflow.task("t1").unwrap().status, "open");

    let result = h
        .workflow
        .force_transition("t1", "archived", None)
        .await
        .unwrap();
    assert!(!result.success);
}
