//! Integration tests for the process supervisor against fake agent scripts.

#![cfg(unix)]

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use agent_relay::config::AgentConfig;
use agent_relay::errors::ProcessFailureKind;
use agent_relay::models::update::{SemanticUpdate, UpdateKind};
use agent_relay::orchestrator::command::CommandSpec;
use agent_relay::orchestrator::sink::NullSink;
use agent_relay::orchestrator::supervisor::{CallLogSource, ProcessSupervisor};
use agent_relay::AppError;

use super::test_helpers::{collect, emit, success_stream, FakeAgent};

const TOOL_STREAM: &str = r#"{"type":"system","subtype":"init","session_id":"sess-tools","tools":["Read","Task"]}
{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"reading"},{"type":"tool_use","id":"r1","name":"Read","input":{"file_path":"a.rs"}}]}}
{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"r1","content":"fn main() {}"}]}}
{"type":"assistant","message":{"id":"m2","content":[{"type":"tool_use","id":"k1","name":"Task","input":{"prompt":"review"}}]}}
{"type":"assistant","message":{"id":"m3","content":[{"type":"text","text":"review looks fine"}]}}
garbage line
{"type":"result","subtype":"success","result":"all good","session_id":"sess-tools","total_cost_usd":0.05,"duration_ms":900,"num_turns":3,"is_error":false}"#;

/// Static call log.
struct FixedCallLog(Vec<Value>);

impl CallLogSource for FixedCallLog {
    fn call_log<'a>(
        &'a self,
        _working_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Vec<Value>> + Send + 'a>> {
        Box::pin(async move { self.0.clone() })
    }
}

// ── Successful runs ──────────────────────────────────────────────────────────

/// A full turn yields live updates and a result with correlated tools.
#[tokio::test]
async fn successful_turn_builds_result() {
    let agent = FakeAgent::emitting(TOOL_STREAM);
    let supervisor = ProcessSupervisor::new(agent.config())
        .with_call_log(Arc::new(FixedCallLog(vec![json!({"tool": "Read"})])));
    let (tx, rx) = mpsc::channel::<SemanticUpdate>(32);

    let result = supervisor
        .execute(&CommandSpec::fresh("review a.rs"), agent.workdir(), &tx)
        .await
        .expect("execution succeeds");
    drop(tx);

    assert_eq!(result.content, "all good");
    assert_eq!(result.session_id, "sess-tools");
    assert!((result.cost_usd - 0.05).abs() < f64::EPSILON);
    assert_eq!(result.num_turns, 3);
    assert_eq!(result.tool_names(), vec!["Read", "Task"]);
    assert_eq!(result.tools_used[0].result.as_deref(), Some("fn main() {}"));
    assert_eq!(
        result.tools_used[1].result.as_deref(),
        Some("review looks fine"),
        "sub-task result falls back to the following assistant text"
    );
    assert_eq!(result.call_log, vec![json!({"tool": "Read"})]);

    let kinds: Vec<UpdateKind> = collect(rx).await.into_iter().map(|u| u.kind).collect();
    assert_eq!(
        kinds,
        vec![
            UpdateKind::System,
            UpdateKind::Assistant,
            UpdateKind::User,
            UpdateKind::Assistant,
            UpdateKind::Assistant,
        ]
    );
    assert_eq!(supervisor.active_count(), 0, "registry must be empty afterwards");
}

/// The agent runs in the working directory with the generated arguments and
/// the project-directory pin.
#[tokio::test]
async fn agent_sees_arguments_and_environment() {
    let body = format!(
        "printf '%s\\n' \"$@\" > args.log\necho \"$CLAUDE_PROJECT_DIR|$CLAUDE_BASH_MAINTAIN_PROJECT_WORKING_DIR\" > env.log\npwd > pwd.log\n{}",
        emit(&success_stream("sess-env", "ok"))
    );
    let agent = FakeAgent::new(&body);
    let config = AgentConfig {
        max_turns: 4,
        allowed_tools: vec!["Read".into()],
        ..agent.config()
    };
    let supervisor = ProcessSupervisor::new(config);

    supervisor
        .execute(&CommandSpec::fresh("hello world"), agent.workdir(), &NullSink)
        .await
        .expect("execution succeeds");

    let args = agent.recorded_args();
    assert_eq!(
        args,
        vec![
            "-p",
            "hello world",
            "--output-format",
            "stream-json",
            "--verbose",
            "--max-turns",
            "4",
            "--allowedTools",
            "Read",
            "--dangerously-skip-permissions",
        ]
    );
    let env = std::fs::read_to_string(agent.workdir().join("env.log")).expect("env.log");
    assert_eq!(env.trim(), format!("{}|true", agent.workdir().display()));
    let pwd = std::fs::read_to_string(agent.workdir().join("pwd.log")).expect("pwd.log");
    assert_eq!(
        std::fs::canonicalize(pwd.trim()).expect("canonical pwd"),
        std::fs::canonicalize(agent.workdir()).expect("canonical workdir")
    );
}

// ── Failures ─────────────────────────────────────────────────────────────────

/// A stream without a result frame is a parsing failure.
#[tokio::test]
async fn missing_result_is_parsing_error() {
    let agent = FakeAgent::emitting(
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#,
    );
    let supervisor = ProcessSupervisor::new(agent.config());

    let err = supervisor
        .execute(&CommandSpec::fresh("x"), agent.workdir(), &NullSink)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Parsing(_)), "got {err}");
}

/// A non-zero exit is classified from standard error.
#[tokio::test]
async fn non_zero_exit_is_classified() {
    let agent = FakeAgent::new("echo 'Error: not authenticated' >&2\nexit 1\n");
    let supervisor = ProcessSupervisor::new(agent.config());

    let err = supervisor
        .execute(&CommandSpec::fresh("x"), agent.workdir(), &NullSink)
        .await
        .expect_err("must fail");
    let AppError::Process(failure) = err else {
        panic!("expected a process failure");
    };
    assert_eq!(failure.kind, ProcessFailureKind::Authentication);
    assert_eq!(failure.exit_code, Some(1));
    assert!(failure.stderr.contains("not authenticated"));
}

/// A rejected continuity id surfaces as a session error.
#[tokio::test]
async fn rejected_continuity_id_is_session_error() {
    let agent = FakeAgent::new("echo 'Error: session not found' >&2\nexit 1\n");
    let supervisor = ProcessSupervisor::new(agent.config());

    let err = supervisor
        .execute(&CommandSpec::resume("gone", "x"), agent.workdir(), &NullSink)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Session(_)), "got {err}");
}

/// A missing binary fails to spawn and leaves nothing registered.
#[tokio::test]
async fn spawn_failure_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = ProcessSupervisor::new(AgentConfig {
        binary: "/nonexistent/agent-binary".into(),
        ..AgentConfig::default()
    });

    let err = supervisor
        .execute(&CommandSpec::fresh("x"), dir.path(), &NullSink)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Io(ref m) if m.contains("failed to spawn")));
    assert_eq!(supervisor.active_count(), 0);
}

// ── Deadlines and shutdown ───────────────────────────────────────────────────

/// A hung agent is killed at the deadline.
#[tokio::test]
async fn deadline_kills_hung_agent() {
    let agent = FakeAgent::new(
        "echo '{\"type\":\"system\",\"subtype\":\"init\"}'\nexec sleep 30\n",
    );
    let supervisor = ProcessSupervisor::new(agent.config());
    let handle = supervisor
        .start(&CommandSpec::fresh("x"), agent.workdir(), Duration::from_millis(300))
        .expect("spawn");
    assert_eq!(supervisor.active_count(), 1);
    assert_eq!(supervisor.active_executions()[0].id, handle.id());

    let started = std::time::Instant::now();
    let err = supervisor
        .await_completion(handle, &NullSink)
        .await
        .expect_err("must time out");

    assert!(matches!(err, AppError::Timeout(_)), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(10), "kill must be prompt");
    assert_eq!(supervisor.active_count(), 0);
}

/// `kill_all` cancels every running execution.
#[tokio::test]
async fn kill_all_cancels_running_executions() {
    let agent = FakeAgent::new("exec sleep 30\n");
    let supervisor = Arc::new(ProcessSupervisor::new(agent.config()));
    let workdir = agent.workdir().to_path_buf();

    let task = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            supervisor
                .execute(&CommandSpec::fresh("x"), &workdir, &NullSink)
                .await
        })
    };

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while supervisor.active_count() == 0 {
        assert!(std::time::Instant::now() < deadline, "execution never registered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(supervisor.kill_all(), 1);
    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancelled execution returns promptly")
        .expect("task joins")
        .expect_err("must be cancelled");
    assert!(matches!(err, AppError::Cancelled(_)), "got {err}");
    assert_eq!(supervisor.active_count(), 0);
}

/// Dropping an un-awaited handle deregisters and kills the execution.
#[tokio::test]
async fn dropped_handle_deregisters() {
    let agent = FakeAgent::new("sleep 1\ntouch survived.marker\n");
    let supervisor = ProcessSupervisor::new(agent.config());

    let handle = supervisor
        .start(&CommandSpec::fresh("x"), agent.workdir(), Duration::from_secs(5))
        .expect("spawn");
    assert_eq!(supervisor.active_count(), 1);
    drop(handle);
    assert_eq!(supervisor.active_count(), 0);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(
        !agent.workdir().join("survived.marker").exists(),
        "agent kept running after its handle was dropped"
    );
}

/// `kill_all` terminates a started execution nobody is awaiting.
#[tokio::test]
async fn kill_all_terminates_unawaited_execution() {
    let agent = FakeAgent::new("sleep 1\ntouch survived.marker\n");
    let marker = agent.workdir().join("survived.marker");
    let supervisor = ProcessSupervisor::new(agent.config());

    let handle = supervisor
        .start(&CommandSpec::fresh("x"), agent.workdir(), Duration::from_secs(10))
        .expect("spawn");
    assert!(handle.execution().pid.is_some(), "spawned process has a pid");
    assert_eq!(handle.execution().working_dir, agent.workdir());

    assert_eq!(supervisor.kill_all(), 1);
    assert_eq!(supervisor.active_count(), 0);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!marker.exists(), "agent kept running after kill_all");
    drop(handle);
}
