// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{exec_harness, pipeline_with, project, wait_for_terminal, ExecHarness};
use crate::ActivityLogger;
use crew_adapters::ScriptedRun;
use crew_core::{AgentRun, SequentialIdGen, Severity, Task};
use std::time::Duration;

type TestSupervisor = AgentSupervisor<
    crew_adapters::FakeGitOps,
    crew_adapters::FakeQueryAgent,
    crew_adapters::FakeNotifyAdapter,
    crew_core::FakeClock,
    SequentialIdGen,
>;

fn harness() -> (ExecHarness, TestSupervisor) {
    let task = Task::builder().id("t1").pipeline_id("dev").status("open").build();
    let h = exec_harness(pipeline_with(vec![]), task, project());
    let supervisor = AgentSupervisor::new(
        h.store.clone(),
        h.executor.clone(),
        ActivityLogger::new(h.store.clone(), h.clock.clone(), SequentialIdGen::new("sup")),
        h.clock.clone(),
        Duration::from_millis(10),
    );
    (h, supervisor)
}

#[tokio::test]
async fn ghost_run_is_reaped_as_interrupted() {
    let (h, supervisor) = harness();
    h.store
        .put_run(
            AgentRun::builder()
                .id("ghost")
                .task_id("t1")
                .started_at_ms(0)
                .timeout_ms(5_000)
                .build(),
        )
        .unwrap();
    h.clock.set_ms(10_000);

    supervisor.tick_once();

    let run = h.store.agent_run("ghost").unwrap();
    assert_eq!(run.status, AgentRunStatus::Failed);
    assert_eq!(run.outcome.as_deref(), Some("interrupted"));
    assert!(run.output.contains("Ghost run"));
    assert_eq!(run.completed_at_ms, Some(10_000));

    let events = h.store.events_for_task("t1");
    assert!(events
        .iter()
        .any(|e| e.severity == Severity::Warning && e.message.contains("Ghost run")));
}

#[tokio::test]
async fn live_run_within_its_timeout_is_left_alone() {
    let (h, supervisor) = harness();
    h.agent.push_run(ScriptedRun::Hang);
    let run = h.executor.execute("t1", "implement", "claude", None).await.unwrap();
    // started_at_ms = 1000, timeout = default 10 min; clock barely moves
    h.clock.set_ms(2_000);

    supervisor.tick_once();

    assert_eq!(
        h.store.agent_run(&run.id).unwrap().status,
        AgentRunStatus::Running
    );
    h.executor.stop(&run.id).unwrap();
    wait_for_terminal(&h.store, &run.id).await;
}

#[tokio::test]
async fn live_run_past_its_timeout_is_stopped_and_marked() {
    let task = Task::builder().id("t1").pipeline_id("dev").status("open").build();
    let mut project = project();
    project.config.agent_timeout_ms = 5_000;
    let h = exec_harness(pipeline_with(vec![]), task, project);
    let supervisor = AgentSupervisor::new(
        h.store.clone(),
        h.executor.clone(),
        ActivityLogger::new(h.store.clone(), h.clock.clone(), SequentialIdGen::new("sup")),
        h.clock.clone(),
        Duration::from_millis(10),
    );

    h.agent.push_run(ScriptedRun::Hang);
    let run = h.executor.execute("t1", "implement", "claude", None).await.unwrap();
    h.clock.set_ms(20_000);

    supervisor.tick_once();

    let row = h.store.agent_run(&run.id).unwrap();
    assert_eq!(row.status, AgentRunStatus::TimedOut);

    // The cancelled background task must not overwrite the terminal
    // status
    for _ in 0..100 {
        if h.executor.live_run_ids().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        h.store.agent_run(&run.id).unwrap().status,
        AgentRunStatus::TimedOut
    );
}

#[tokio::test]
async fn start_is_idempotent_and_stop_is_safe() {
    let (_h, supervisor) = harness();
    supervisor.stop(); // never started: no-op

    supervisor.start();
    supervisor.start(); // second start is a no-op

    supervisor.stop();
    supervisor.stop(); // double stop is a no-op
}

#[tokio::test]
async fn loop_reaps_on_its_own_timer() {
    let (h, supervisor) = harness();
    h.store
        .put_run(AgentRun::builder().id("ghost").task_id("t1").build())
        .unwrap();

    supervisor.start();
    for _ in 0..100 {
        if h.store.agent_run("ghost").unwrap().status != AgentRunStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    supervisor.stop();

    assert_eq!(
        h.store.agent_run("ghost").unwrap().status,
        AgentRunStatus::Failed
    );
}
