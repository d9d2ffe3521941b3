//! Guard evaluation through the facade.

use crate::prelude::*;
use crew_core::{GuardRef, Severity, Transition, Trigger};

fn guarded_pipeline() -> crew_core::Pipeline {
    pipeline(
        vec![status("pr_review", false), status("done", true)],
        vec![Transition::new("pr_review", "done", Trigger::Manual)
            .guard(GuardRef::named("has_pr"))],
    )
}

#[tokio::test]
async fn guard_block_surfaces_the_failure() {
    let h = harness();
    h.workflow.add_pipeline(guarded_pipeline()).unwrap();
    // No PR link on the task
    h.workflow.create_task(task("t1", "pr_review")).unwrap();

    let result = h.workflow.transition("t1", "done", None).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.guard_failures.len(), 1);
    assert_eq!(result.guard_failures[0].guard, "has_pr");
    assert_eq!(result.guard_failures[0].reason, "Task must have a PR link");
    assert_eq!(h.workflow.task("t1").unwrap().status, "pr_review");

    // A warning event names the failed guards
    let events = h.workflow.task_events("t1");
    assert!(events
        .iter()
        .any(|e| e.severity == Severity::Warning && e.message.contains("has_pr")));
}

#[tokio::test]
async fn guard_passes_once_the_pr_exists() {
    let h = harness();
    h.workflow.add_pipeline(guarded_pipeline()).unwrap();
    let mut t = task("t1", "pr_review");
    t.pr_link = Some("https://example.test/pr/7".to_string());
    h.workflow.create_task(t).unwrap();

    let result = h.workflow.transition("t1", "done", None).await.unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn check_guards_dry_runs_without_moving_the_task() {
    let h = harness();
    h.workflow.add_pipeline(guarded_pipeline()).unwrap();
    h.workflow.create_task(task("t1", "pr_review")).unwrap();

    let check = h
        .workflow
        .check_guards("t1", "done", Trigger::Manual)
        .unwrap()
        .expect("the arc exists");

    assert!(!check.allowed);
    assert_eq!(check.results.len(), 1);
    assert!(!check.results[0].allowed);
    assert_eq!(h.workflow.task("t1").unwrap().status, "pr_review");
    assert!(h.workflow.store().history_for_task("t1").is_empty());
}
