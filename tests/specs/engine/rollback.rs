//! Required-hook failure compensation.

use crate::prelude::*;
use crew_core::{HookPolicy, HookRef, Severity, Transition, Trigger};

fn pr_pipeline() -> crew_core::Pipeline {
    pipeline(
        vec![status("implementing", false), status("pr_review", false)],
        vec![Transition::new("implementing", "pr_review", Trigger::Manual)
            .hook(HookRef::named("push_and_create_pr").with_policy(HookPolicy::Required))],
    )
}

#[tokio::test]
async fn required_hook_failure_rolls_the_status_back() {
    let h = harness();
    h.workflow.add_pipeline(pr_pipeline()).unwrap();
    let mut t = task("t1", "implementing");
    t.branch_name = Some("task/t1/implement".to_string());
    h.workflow.create_task(t).unwrap();

    h.scm.fail_create_pr("502 from the forge");

    let result = h.workflow.transition("t1", "pr_review", None).await.unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("push_and_create_pr:"), "{error}");
    assert!(error.contains("502 from the forge"));

    assert_eq!(result.hook_failures.len(), 1);
    assert_eq!(result.hook_failures[0].hook, "push_and_create_pr");
    assert_eq!(result.hook_failures[0].policy, HookPolicy::Required);

    // The committed status change was compensated
    assert_eq!(h.workflow.task("t1").unwrap().status, "implementing");

    let events = h.workflow.task_events("t1");
    assert!(events
        .iter()
        .any(|e| e.severity == Severity::Error && e.message.contains("rolled back")));
}

#[tokio::test]
async fn required_hook_success_keeps_the_transition_and_links_the_pr() {
    let h = harness();
    h.workflow.add_pipeline(pr_pipeline()).unwrap();
    let mut t = task("t1", "implementing");
    t.branch_name = Some("task/t1/implement".to_string());
    h.workflow.create_task(t).unwrap();

    let result = h.workflow.transition("t1", "pr_review", None).await.unwrap();

    assert!(result.success);
    let task = h.workflow.task("t1").unwrap();
    assert_eq!(task.status, "pr_review");
    assert_eq!(task.pr_link.as_deref(), Some("https://example.test/pr/1"));
    assert!(h.git.ops().contains(&"push".to_string()));
}
