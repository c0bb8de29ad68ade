#![forbid(unsafe_code)]

//! `agent-relay`: runs prompts through a headless agent CLI.
//!
//! Live updates are written to stdout as NDJSON, followed by the final
//! result object. Logs go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::config::GlobalConfig;
use agent_relay::models::update::SemanticUpdate;
use agent_relay::orchestrator::relay::{AgentRelay, RelayRequest};
use agent_relay::orchestrator::session_manager::SessionManager;
use agent_relay::orchestrator::supervisor::ProcessSupervisor;
use agent_relay::persistence::memory::InMemorySessionStore;
use agent_relay::persistence::session_repo::SessionRepo;
use agent_relay::persistence::{db, retention, SessionStore};
use agent_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Headless agent CLI relay", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one prompt and stream its updates.
    Run {
        /// Requesting user id.
        #[arg(long, default_value = "local")]
        user: String,
        /// Working directory for the agent; defaults to the current directory.
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Session id to continue.
        #[arg(long)]
        session: Option<String>,
        /// Prompt text.
        prompt: String,
    },
    /// Show a user's sessions and usage summary.
    Sessions {
        /// User id to report on.
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Remove expired sessions.
    Sweep,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env()?;
    info!(binary = %config.agent.binary, "configuration loaded");

    // ── Initialize session storage ──────────────────────
    let store: Arc<dyn SessionStore> = match &config.db_path {
        Some(path) => {
            let database = Arc::new(db::connect(path).await?);
            info!(db_path = %path.display(), "database connected");
            Arc::new(SessionRepo::new(database))
        }
        None => {
            info!("no db_path configured; sessions are kept in memory");
            Arc::new(InMemorySessionStore::new())
        }
    };
    let sessions = Arc::new(SessionManager::new(config.sessions.clone(), store));

    match args.command {
        Command::Run {
            user,
            workdir,
            session,
            prompt,
        } => {
            let working_dir = match workdir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            }
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workdir: {err}")))?;

            let supervisor = Arc::new(ProcessSupervisor::new(config.agent.clone()));
            let relay = AgentRelay::new(supervisor, Arc::clone(&sessions));
            let request = RelayRequest {
                user_id: user,
                working_dir,
                prompt,
                session_id: session,
            };
            run_prompt(&relay, &request, &config).await
        }
        Command::Sessions { user } => {
            #[derive(Serialize)]
            struct Report<T, U> {
                summary: T,
                sessions: U,
            }
            let report = Report {
                summary: sessions.user_summary(&user).await?,
                sessions: sessions.user_sessions(&user).await?,
            };
            print_json(&report)
        }
        Command::Sweep => {
            let removed = sessions.sweep_expired().await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

async fn run_prompt(relay: &AgentRelay, request: &RelayRequest, config: &GlobalConfig) -> Result<()> {
    // ── Start expiry service ────────────────────────────
    let ct = CancellationToken::new();
    let expiry_handle = retention::spawn_expiry_task(
        Arc::clone(relay.sessions()),
        config.sessions.cleanup_interval(),
        ct.clone(),
    );

    // ── Stream updates to stdout ────────────────────────
    let (tx, mut rx) = mpsc::channel::<SemanticUpdate>(64);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let Err(err) = print_json(&update) {
                error!(%err, "failed to write update");
            }
        }
    });

    let outcome = tokio::select! {
        result = relay.run(request, &tx) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Err(AppError::Cancelled("interrupted by signal".into()))
        }
    };

    relay.shutdown().await?;
    drop(tx);
    if let Err(err) = printer.await {
        error!(%err, "update printer task failed");
    }
    ct.cancel();
    if let Err(err) = expiry_handle.await {
        error!(%err, "expiry task failed");
    }

    match outcome {
        Ok(result) => print_json(&result),
        Err(err) => {
            error!(%err, "prompt failed");
            eprintln!("{}", err.user_message());
            Err(err)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| AppError::Io(format!("failed to serialize output: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
