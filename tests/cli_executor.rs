// tests/cli_executor.rs
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use openfars::config::ConstraintsSection;
use openfars::exec::{
    AttemptStatus, CliExecutor, MockExecutor, StepExecutor, StepRequest, StepResult, TaskSpec,
};
use openfars_test_utils::{init_tracing, with_timeout};

/// The executor runs `<command> run task_spec.json`; with `/bin/sh` as the
/// command, the shell executes the `run` script placed in the workspace.
fn shell_executor() -> CliExecutor {
    CliExecutor::new("/bin/sh", MockExecutor::new(Duration::ZERO))
}

fn request(workspace: &Path, soft: u64, hard: u64) -> StepRequest {
    StepRequest {
        task_spec: TaskSpec::for_step(
            "FA000001",
            "run_0000000001",
            "code_and_execute",
            &ConstraintsSection::default(),
        ),
        step_key: "code_and_execute".into(),
        executor_enabled: true,
        workspace_dir: workspace.to_path_buf(),
        attempt: 1,
        soft_timeout: Duration::from_secs(soft),
        hard_timeout: Duration::from_secs(hard),
    }
}

fn workspace_with_script(script: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws").join("code_and_execute");
    fs::create_dir_all(&workspace).unwrap();
    fs::write(workspace.join("run"), script).unwrap();
    (dir, workspace)
}

async fn run(executor: &CliExecutor, request: StepRequest) -> StepResult {
    with_timeout(executor.run_step(request)).await
}

#[tokio::test]
async fn successful_run_parses_result_and_filters_artifacts() {
    init_tracing();
    let (dir, workspace) = workspace_with_script(
        r#"
echo "working on $1"
echo hi > out.txt
cat <<'EOF'
<openfars_result>
{"status": "success", "summary": "analysis done",
 "artifacts": ["out.txt", "../../outside.txt", "missing.txt"],
 "metrics": {"tokens": 42, "cost_usd": 0.5}}
</openfars_result>
EOF
"#,
    );
    fs::write(dir.path().join("outside.txt"), "x").unwrap();

    let result = run(&shell_executor(), request(&workspace, 5, 10)).await;

    assert_eq!(result.status, AttemptStatus::Success);
    assert_eq!(result.summary, "analysis done");
    assert!(!result.retriable);
    assert_eq!(result.metrics.tokens, 42);
    assert_eq!(result.metrics.cost_usd, 0.5);
    assert_eq!(
        result.artifacts,
        vec![workspace.join("out.txt").canonicalize().unwrap()]
    );

    assert_eq!(result.logs.len(), 1);
    let log = &result.logs[0];
    assert_eq!(log.status, "completed");
    assert!(log.raw.contains("working on"));
    assert!(log.raw.contains("task_spec.json"));
    assert!(log.worked_for.ends_with('s'));
    // The orchestrator owns `task_spec.json`; the executor only passes its path.
    assert!(!workspace.join("task_spec.json").exists());

}

#[tokio::test]
async fn reported_failure_is_retriable() {
    let (_dir, workspace) = workspace_with_script(
        "echo '<openfars_result>{\"status\":\"failed\",\"summary\":\"no data\"}</openfars_result>'\n",
    );
    let result = run(&shell_executor(), request(&workspace, 5, 10)).await;
    assert_eq!(result.status, AttemptStatus::Failed);
    assert_eq!(result.summary, "no data");
    assert!(result.retriable);
}

#[tokio::test]
async fn non_zero_exit_is_retriable_failure() {
    let (_dir, workspace) = workspace_with_script("echo boom >&2\nexit 3\n");
    let result = run(&shell_executor(), request(&workspace, 5, 10)).await;

    assert_eq!(result.status, AttemptStatus::Failed);
    assert!(result.retriable);
    assert!(result.summary.contains("non-zero"));
    assert!(result.logs[0].raw.contains("boom"));
    assert_eq!(result.logs[0].level, "error");
}

#[tokio::test]
async fn missing_result_block_is_retriable_failure() {
    let (_dir, workspace) = workspace_with_script("echo just chatter\n");
    let result = run(&shell_executor(), request(&workspace, 5, 10)).await;

    assert_eq!(result.status, AttemptStatus::Failed);
    assert!(result.retriable);
    assert!(result.summary.contains("missing"));
}

#[tokio::test]
async fn soft_timeout_terminates_the_process() {
    init_tracing();
    let (_dir, workspace) = workspace_with_script("exec sleep 30\n");

    let started = Instant::now();
    let result = run(&shell_executor(), request(&workspace, 1, 3)).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.status, AttemptStatus::Failed);
    assert!(result.retriable);
    assert!(result.logs[0].content.contains("timed out"));
}

#[tokio::test]
async fn process_ignoring_terminate_is_killed_at_hard_timeout() {
    init_tracing();
    // `sleep` gets its own output so the pipes close once the shell is killed.
    let (_dir, workspace) =
        workspace_with_script("trap '' TERM\nsleep 30 >/dev/null 2>&1\necho never\n");

    let started = Instant::now();
    let result = run(&shell_executor(), request(&workspace, 1, 2)).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert_eq!(result.status, AttemptStatus::Failed);
    assert!(result.retriable);
    assert!(result.logs[0].content.contains("timed out"));
    assert!(!result.logs[0].raw.contains("never"));
}

#[tokio::test]
async fn steps_outside_the_executor_use_the_built_in_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request(dir.path(), 5, 10);
    req.step_key = "topic_scoping".into();
    req.executor_enabled = false;

    let result = run(&shell_executor(), req).await;
    assert!(result.is_success());
    assert!(result.logs[0].content.starts_with("Executing topic_scoping"));
}

#[tokio::test]
async fn missing_command_falls_back_to_built_in_executor() {
    let dir = tempfile::tempdir().unwrap();
    let executor = CliExecutor::new(
        "openfars-no-such-executor-binary",
        MockExecutor::new(Duration::ZERO),
    );
    let mut req = request(dir.path(), 5, 10);
    req.attempt = 2;

    let result = run(&executor, req).await;
    assert!(result.is_success());
    assert_eq!(result.metrics.tokens, 180_000);
}

#[tokio::test]
async fn denied_command_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let executor = CliExecutor::new("shutdown", MockExecutor::new(Duration::ZERO));

    let result = run(&executor, request(dir.path(), 5, 10)).await;
    assert_eq!(result.status, AttemptStatus::Failed);
    assert!(!result.retriable);
    assert!(!dir.path().join("task_spec.json").exists());
}
