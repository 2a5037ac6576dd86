// tests/end_to_end.rs

use std::sync::Arc;
use std::time::Duration;

use openfars::catalog;
use openfars::events::{EventMessage, EventName};
use openfars::exec::MockExecutor;
use openfars::store::{RunStore, DEFAULT_JOB_LIMIT};
use openfars::types::{ProjectStatus, RunStatus, StepStatus};
use openfars_test_utils::builders::Harness;
use openfars_test_utils::fake_executor::ScriptedExecutor;
use openfars_test_utils::{init_tracing, recv_until_terminal, with_timeout};

fn running_attempts(events: &[EventMessage], step_key: &str) -> usize {
    events
        .iter()
        .filter(|m| m.event == EventName::StepUpdated)
        .filter(|m| m.payload["step"]["stepKey"] == step_key)
        .filter(|m| m.payload["step"]["status"] == "running")
        .count()
}

#[tokio::test]
async fn mock_pipeline_completes_after_one_transient_failure() {
    init_tracing();
    let h = Harness::new(Arc::new(MockExecutor::new(Duration::ZERO)));
    let run = h.orchestrator.create_run(&h.project.id).unwrap();

    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    assert!(h.orchestrator.start_run(&run.id));
    let events = with_timeout(recv_until_terminal(&mut sub)).await;

    assert_eq!(events[0].event, EventName::Snapshot);
    assert_eq!(events[1].event, EventName::RunStarted);
    assert_eq!(events.last().unwrap().event, EventName::RunCompleted);

    let snapshot = h.orchestrator.run_snapshot(&run.id).unwrap();
    assert_eq!(snapshot.run.status, RunStatus::Completed);
    assert_eq!(snapshot.run.current_step_index, catalog::len() - 1);
    assert!(snapshot.run.started_at.is_some());
    assert!(snapshot.run.ended_at.is_some());

    assert_eq!(snapshot.steps.len(), 8);
    for (idx, step) in snapshot.steps.iter().enumerate() {
        assert_eq!(step.number as usize, idx + 1);
        assert_eq!(step.status, StepStatus::Completed, "step {}", step.step_key);
        assert!(step.error_message.is_none());
    }

    assert!(snapshot.jobs.len() >= 8);
    assert!(snapshot.artifacts.iter().any(|a| a.path.ends_with("report.json")));
    assert!(snapshot.artifacts.iter().any(|a| a.path.ends_with("paper_draft.tex")));
    for artifact in &snapshot.artifacts {
        assert!(artifact.size > 0);
        assert_eq!(artifact.hash.len(), 64);
    }

    assert_eq!(running_attempts(&events, "code_and_execute"), 2);
    for key in catalog::steps().iter().map(|d| d.key).filter(|k| *k != "code_and_execute") {
        assert_eq!(running_attempts(&events, key), 1, "{key}");
    }

    let project = h.store.get_project(&h.project.id).unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn completion_event_carries_run_stats_and_artifacts() {
    init_tracing();
    let h = Harness::new(Arc::new(MockExecutor::new(Duration::ZERO)));
    let run = h.orchestrator.create_run(&h.project.id).unwrap();

    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    h.orchestrator.start_run(&run.id);
    let events = with_timeout(recv_until_terminal(&mut sub)).await;
    let done = events.last().unwrap();

    assert_eq!(done.payload["run"]["status"], "completed");
    assert_eq!(done.payload["artifacts"].as_array().unwrap().len(), 2);

    let stats = &done.payload["stats"];
    assert_eq!(stats["hypothesis"], 66);
    assert_eq!(stats["papers"], 24);
    // 8 successful attempts at 180K tokens plus one failed attempt at 120K.
    assert_eq!(stats["tokens"], "1.6M");
    assert_eq!(stats["cost"], "10.44");
    assert_eq!(stats["elapsedTime"], "00:01:48");
    assert_eq!(h.orchestrator.get_stats_view(&run.id).tokens, "1.6M");
}

#[tokio::test]
async fn stats_never_decrease_across_events() {
    init_tracing();
    let h = Harness::new(Arc::new(MockExecutor::new(Duration::ZERO)));
    let run = h.orchestrator.create_run(&h.project.id).unwrap();

    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    h.orchestrator.start_run(&run.id);
    let events = with_timeout(recv_until_terminal(&mut sub)).await;

    let updates: Vec<_> = events
        .iter()
        .filter(|m| m.event == EventName::StatsUpdated)
        .map(|m| &m.payload["stats"])
        .collect();
    assert_eq!(updates.len(), 9);

    for pair in updates.windows(2) {
        for field in ["hypothesis", "papers"] {
            assert!(pair[1][field].as_u64() >= pair[0][field].as_u64(), "{field}");
        }
        for field in ["tokenCostUsd", "gpuHours"] {
            assert!(pair[1][field].as_f64() >= pair[0][field].as_f64(), "{field}");
        }
    }
}

#[tokio::test]
async fn scripted_pipeline_records_attempts_in_catalog_order() {
    init_tracing();
    let exec = ScriptedExecutor::new();
    exec.fail("code_and_execute", 1, true);
    exec.produce("final_packaging", "report.json");
    exec.produce("final_packaging", "paper_draft.tex");

    let h = Harness::new(exec.clone());
    let run = h.orchestrator.create_run(&h.project.id).unwrap();
    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    h.orchestrator.start_run(&run.id);
    let events = with_timeout(recv_until_terminal(&mut sub)).await;
    assert_eq!(events.last().unwrap().event, EventName::RunCompleted);

    let keys: Vec<String> = catalog::steps().iter().map(|d| d.key.to_string()).collect();
    assert_eq!(exec.steps_run(), keys);
    assert_eq!(exec.attempts_for("code_and_execute"), 2);
    assert!(exec.calls().contains(&("code_and_execute".to_string(), 2)));

    let artifacts = h.store.list_artifacts(&run.id).unwrap();
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts.iter().all(|a| a.path.starts_with("workspace/")));

    let jobs = h.store.list_jobs(&run.id, DEFAULT_JOB_LIMIT).unwrap();
    assert_eq!(jobs.len(), 9);

    let step_dir = h
        .workspace_root()
        .join(&h.project.id)
        .join(&run.id)
        .join("code_and_execute");
    assert!(step_dir.join("task_spec.json").is_file());
    let checkpoint: serde_json::Value =
        serde_json::from_slice(&std::fs::read(step_dir.join("step_state.json")).unwrap()).unwrap();
    assert_eq!(checkpoint["attempt"], 2);
    assert_eq!(checkpoint["status"], "success");
}

#[tokio::test]
async fn retry_message_names_attempt_and_budget() {
    init_tracing();
    let exec = ScriptedExecutor::new();
    exec.fail("literature_review", 2, true);

    let h = Harness::new(exec.clone());
    let run = h.orchestrator.create_run(&h.project.id).unwrap();
    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    h.orchestrator.start_run(&run.id);
    let events = with_timeout(recv_until_terminal(&mut sub)).await;

    let messages: Vec<&str> = events
        .iter()
        .filter(|m| m.event == EventName::StepUpdated)
        .filter(|m| m.payload["step"]["status"] == "error")
        .filter_map(|m| m.payload["step"]["errorMessage"].as_str())
        .collect();
    assert_eq!(
        messages,
        vec![
            "scripted transient failure; retry 1/2",
            "scripted transient failure; retry 2/2"
        ]
    );
    assert_eq!(events.last().unwrap().event, EventName::RunCompleted);
    assert_eq!(exec.attempts_for("literature_review"), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_and_stop_the_pipeline() {
    init_tracing();
    let exec = ScriptedExecutor::new();
    exec.fail("experiment_planning", 10, true);

    let h = Harness::new(exec.clone());
    let run = h.orchestrator.create_run(&h.project.id).unwrap();
    let mut sub = h.orchestrator.attach(&run.id, 1024).unwrap();
    h.orchestrator.start_run(&run.id);
    let events = with_timeout(recv_until_terminal(&mut sub)).await;

    let failed = events.last().unwrap();
    assert_eq!(failed.event, EventName::RunFailed);
    assert_eq!(failed.payload["reason"], "scripted transient failure");

    assert_eq!(exec.attempts_for("experiment_planning"), 3);
    assert_eq!(exec.attempts_for("code_and_execute"), 0);

    let step = h.store.get_step_by_key(&run.id, "experiment_planning").unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Error);
    assert_eq!(step.error_message.as_deref(), Some("scripted transient failure"));
    assert!(step.ended_at.is_some());

    let run = h.store.get_run(&run.id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.current_step_index, 3);
}

#[tokio::test]
async fn non_retriable_failure_gets_a_single_attempt() {
    init_tracing();
    let exec = ScriptedExecutor::new();
    exec.fail("topic_scoping", 1, false);

    let h = Harness::new(exec.clone());
    let run = h.orchestrator.create_run(&h.project.id).unwrap();
    h.orchestrator.start_run(&run.id);
    with_timeout(h.orchestrator.wait_for_idle(&run.id)).await;

    assert_eq!(exec.calls(), vec![("topic_scoping".to_string(), 1)]);
    let run = h.store.get_run(&run.id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn zero_retries_budget_fails_on_first_transient_error() {
    init_tracing();
    let exec = ScriptedExecutor::new();
    exec.fail("topic_scoping", 1, true);

    let h = Harness::with_options(exec.clone(), |mut o| {
        o.max_retries = 0;
        o
    });
    let run = h.orchestrator.create_run(&h.project.id).unwrap();
    h.orchestrator.start_run(&run.id);
    with_timeout(h.orchestrator.wait_for_idle(&run.id)).await;

    assert_eq!(exec.attempts_for("topic_scoping"), 1);
    assert_eq!(h.store.get_run(&run.id).unwrap().unwrap().status, RunStatus::Failed);
}
