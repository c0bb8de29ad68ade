//! Agent process supervisor.
//!
//! Spawns one agent process per execution and registers it under a freshly
//! generated execution id. Each process gets:
//! - A monitor task owning the `Child`. It reaps the process on exit and
//!   kills it as soon as the execution's cancellation token fires, whether
//!   from [`ProcessSupervisor::kill_all`], a deadline or a dropped handle.
//! - The parent environment plus the working-directory pin from
//!   [`agent_env`].
//! - A hard deadline racing the whole read-and-wait sequence. On expiry the
//!   process is killed and reaped before `AppError::Timeout` is returned.
//!
//! The registry entry is removed by a drop guard, so cleanup happens on every
//! exit path: success, failure, timeout, cancellation or a dropped handle.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::models::execution::{Execution, ExecutionResult};
use crate::orchestrator::command::{agent_env, CommandSpec};
use crate::orchestrator::exit::classify_exit;
use crate::orchestrator::sink::UpdateSink;
use crate::stream::aggregator::TurnAggregator;
use crate::stream::reader::pump_frames;
use crate::{AppError, Result};

/// Bytes of standard error retained for exit classification.
const STDERR_CAPTURE_BYTES: usize = 64 * 1024;

/// How long to wait for the stderr drain after the process has exited.
const STDERR_GRACE: Duration = Duration::from_secs(5);

/// Side-channel source of tool-call records for a working directory.
pub trait CallLogSource: Send + Sync {
    /// Call-log entries recorded for `working_dir`.
    fn call_log<'a>(
        &'a self,
        working_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Vec<Value>> + Send + 'a>>;
}

#[derive(Debug)]
struct RegistryEntry {
    execution: Execution,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, RegistryEntry>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, RegistryEntry>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the registry entry when the execution handle goes away.
#[derive(Debug)]
struct RegistryGuard {
    execution_id: String,
    registry: Registry,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if lock(&self.registry).remove(&self.execution_id).is_some() {
            debug!(execution_id = %self.execution_id, "execution deregistered");
        }
    }
}

/// Handle to a started execution, consumed by
/// [`ProcessSupervisor::await_completion`].
#[derive(Debug)]
pub struct RunningExecution {
    execution: Execution,
    exit: oneshot::Receiver<std::io::Result<ExitStatus>>,
    stdout: ChildStdout,
    stderr: JoinHandle<String>,
    cancel: CancellationToken,
    _kill_on_drop: DropGuard,
    _guard: RegistryGuard,
}

impl RunningExecution {
    /// Registry record of this execution.
    #[must_use]
    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Generated execution id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.execution.id
    }
}

/// Owns every live agent process of one service instance.
pub struct ProcessSupervisor {
    config: AgentConfig,
    registry: Registry,
    call_log: Option<Arc<dyn CallLogSource>>,
}

impl ProcessSupervisor {
    /// Create a supervisor with an empty registry.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            call_log: None,
        }
    }

    /// Attach a side-channel call-log source queried at finalization.
    #[must_use]
    pub fn with_call_log(mut self, source: Arc<dyn CallLogSource>) -> Self {
        self.call_log = Some(source);
        self
    }

    /// Agent settings used for every spawn.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Spawn the agent for `spec` in `working_dir` and register it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process cannot be spawned or its pipes
    /// cannot be captured.
    pub fn start(
        &self,
        spec: &CommandSpec,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<RunningExecution> {
        let execution_id = Uuid::new_v4().to_string();
        let mode = spec.mode();

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.binary_args)
            .args(spec.args(&self.config))
            .envs(agent_env(working_dir))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Io(format!(
                "failed to spawn agent `{}`: {err}",
                self.config.binary
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io("failed to capture agent stderr".into()))?;

        let execution = Execution {
            id: execution_id.clone(),
            working_dir: PathBuf::from(working_dir),
            mode,
            started_at: Utc::now(),
            timeout,
            pid: child.id(),
        };
        let cancel = CancellationToken::new();
        let (exit_tx, exit) = oneshot::channel();
        tokio::spawn(monitor_child(
            execution_id.clone(),
            child,
            cancel.clone(),
            exit_tx,
        ));

        lock(&self.registry).insert(
            execution_id.clone(),
            RegistryEntry {
                execution: execution.clone(),
                cancel: cancel.clone(),
            },
        );

        info!(
            execution_id,
            pid = ?execution.pid,
            ?mode,
            working_dir = %working_dir.display(),
            timeout_secs = timeout.as_secs(),
            "agent process started"
        );

        Ok(RunningExecution {
            execution,
            exit,
            stdout,
            stderr: tokio::spawn(drain_stderr(stderr)),
            _kill_on_drop: cancel.clone().drop_guard(),
            cancel,
            _guard: RegistryGuard {
                execution_id,
                registry: Arc::clone(&self.registry),
            },
        })
    }

    /// Stream the execution to completion and build its result.
    ///
    /// Live updates go to `sink`; sink failures never abort the stream.
    ///
    /// # Errors
    ///
    /// - `AppError::Timeout`: the deadline fired; the process was killed.
    /// - `AppError::Cancelled`: [`kill_all`](Self::kill_all) ran meanwhile.
    /// - `AppError::Process` / `AppError::Session`: non-zero exit.
    /// - `AppError::Parsing`: the stream carried no `result` frame.
    /// - `AppError::Io`: waiting on the process failed.
    pub async fn await_completion(
        &self,
        handle: RunningExecution,
        sink: &dyn UpdateSink,
    ) -> Result<ExecutionResult> {
        let span = info_span!("execution", execution_id = %handle.execution.id);
        self.drive(handle, sink).instrument(span).await
    }

    /// Start and await one execution with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start) and
    /// [`await_completion`](Self::await_completion).
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        working_dir: &Path,
        sink: &dyn UpdateSink,
    ) -> Result<ExecutionResult> {
        let handle = self.start(spec, working_dir, self.config.timeout())?;
        self.await_completion(handle, sink).await
    }

    /// Terminate every registered execution and clear the registry.
    ///
    /// Returns the number of executions signalled. Every process is killed
    /// and reaped by its monitor task, awaited or not; an awaiting caller
    /// observes `AppError::Cancelled`.
    pub fn kill_all(&self) -> usize {
        let drained: Vec<(String, RegistryEntry)> = lock(&self.registry).drain().collect();
        for (execution_id, entry) in &drained {
            entry.cancel.cancel();
            info!(execution_id, pid = ?entry.execution.pid, "agent process terminated by kill_all");
        }
        drained.len()
    }

    /// Number of registered executions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Snapshot of registered executions.
    #[must_use]
    pub fn active_executions(&self) -> Vec<Execution> {
        lock(&self.registry)
            .values()
            .map(|entry| entry.execution.clone())
            .collect()
    }

    async fn drive(
        &self,
        handle: RunningExecution,
        sink: &dyn UpdateSink,
    ) -> Result<ExecutionResult> {
        let RunningExecution {
            execution,
            mut exit,
            stdout,
            stderr,
            cancel,
            _kill_on_drop,
            _guard,
        } = handle;
        let started = Instant::now();
        let mut aggregator =
            TurnAggregator::new(self.config.subtask_tool.as_str(), self.config.history_limit);

        let mut reaped = false;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AppError::Cancelled(format!(
                "execution {} terminated by shutdown",
                execution.id
            ))),
            waited = tokio::time::timeout(execution.timeout, async {
                pump_frames(
                    &execution.id,
                    stdout,
                    self.config.read_chunk_bytes,
                    self.config.max_line_bytes,
                    &mut aggregator,
                    sink,
                )
                .await;
                (&mut exit).await
            }) => match waited {
                Ok(Ok(status)) => {
                    reaped = true;
                    status.map_err(AppError::from)
                }
                Ok(Err(_closed)) => {
                    reaped = true;
                    Err(AppError::Io(format!(
                        "execution {} lost its process monitor",
                        execution.id
                    )))
                }
                Err(_elapsed) => Err(AppError::Timeout(format!(
                    "execution {} exceeded {}s",
                    execution.id,
                    execution.timeout.as_secs()
                ))),
            },
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                if !reaped {
                    cancel.cancel();
                    if let Ok(Err(wait_err)) = exit.await {
                        warn!(error = %wait_err, "failed to reap agent process");
                    }
                }
                stderr.abort();
                warn!(error = %err, summary = %aggregator.summary(), "execution aborted");
                return Err(err);
            }
        };

        let stderr_text = match tokio::time::timeout(STDERR_GRACE, stderr).await {
            Ok(Ok(text)) => text,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "stderr drain task failed");
                String::new()
            }
            Err(_elapsed) => {
                warn!("stderr still open after process exit, ignoring");
                String::new()
            }
        };

        if !status.success() {
            let err = classify_exit(status.code(), &stderr_text);
            warn!(exit_code = ?status.code(), error = %err, "agent process failed");
            return Err(err);
        }

        let call_log = match &self.call_log {
            Some(source) => source.call_log(&execution.working_dir).await,
            None => Vec::new(),
        };

        let malformed = aggregator.malformed_count();
        let result = aggregator.finish(call_log)?;
        info!(
            session_id = %result.session_id,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            num_turns = result.num_turns,
            tools = result.tools_used.len(),
            malformed,
            is_error = result.is_error,
            "execution completed"
        );
        Ok(result)
    }
}

/// Own `child` until it exits, killing it once `kill` fires.
async fn monitor_child(
    execution_id: String,
    mut child: Child,
    kill: CancellationToken,
    exit_tx: oneshot::Sender<std::io::Result<ExitStatus>>,
) {
    let status = tokio::select! {
        biased;
        () = kill.cancelled() => {
            if let Err(err) = child.kill().await {
                warn!(execution_id, error = %err, "failed to kill agent process");
            }
            child.wait().await
        }
        status = child.wait() => status,
    };
    debug!(execution_id, status = ?status.as_ref().ok(), "agent process reaped");
    if exit_tx.send(status).is_err() {
        debug!(execution_id, "exit status dropped, handle already gone");
    }
}

/// Read stderr to EOF, keeping the first [`STDERR_CAPTURE_BYTES`].
async fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut captured: Vec<u8> = Vec::new();
    let mut chunk = [0_u8; 8192];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = STDERR_CAPTURE_BYTES.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(err) => {
                debug!(error = %err, "agent stderr read failed");
                break;
            }
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}
