//! Unit tests for configuration parsing, defaults and overrides.

use std::collections::HashMap;
use std::time::Duration;

use agent_relay::config::DEFAULT_ALLOWED_TOOLS;
use agent_relay::{AppError, GlobalConfig};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

// ── Defaults ─────────────────────────────────────────────────────────────────

/// An empty document yields the documented defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");

    assert!(config.db_path.is_none());
    assert_eq!(config.agent.binary, "claude");
    assert_eq!(config.agent.timeout(), Duration::from_secs(300));
    assert_eq!(config.agent.max_turns, 50);
    assert!(config.agent.skip_permissions);
    assert_eq!(config.agent.subtask_tool, "Task");
    assert_eq!(config.agent.allowed_tools.len(), DEFAULT_ALLOWED_TOOLS.len());
    assert_eq!(config.agent.max_line_bytes, 8 * 1024 * 1024);
    assert_eq!(config.sessions.timeout_hours, 24);
    assert_eq!(config.sessions.max_per_user, 5);
    assert_eq!(config.sessions.idle_timeout(), chrono::Duration::hours(24));
    assert_eq!(config.sessions.cleanup_interval(), Duration::from_secs(300));
}

/// Explicit values override the defaults section by section.
#[test]
fn toml_values_are_applied() {
    let config = GlobalConfig::from_toml_str(
        r#"
db_path = "data/sessions.db"

[agent]
binary = "/opt/agent/bin/claude"
binary_args = ["--profile", "ci"]
timeout_seconds = 60
max_turns = 5
allowed_tools = ["Read"]
skip_permissions = false

[sessions]
timeout_hours = 2
max_per_user = 3
"#,
    )
    .expect("valid config");

    assert_eq!(
        config.db_path.as_deref(),
        Some(std::path::Path::new("data/sessions.db"))
    );
    assert_eq!(config.agent.binary, "/opt/agent/bin/claude");
    assert_eq!(config.agent.binary_args, vec!["--profile", "ci"]);
    assert_eq!(config.agent.timeout_seconds, 60);
    assert_eq!(config.agent.allowed_tools, vec!["Read"]);
    assert!(!config.agent.skip_permissions);
    assert_eq!(config.sessions.max_per_user, 3);
    assert_eq!(
        config.sessions.cleanup_interval_seconds, 300,
        "unspecified fields keep their default"
    );
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Zero values that would disable core behavior are rejected.
#[test]
fn zero_values_are_rejected() {
    for raw in [
        "[agent]\ntimeout_seconds = 0",
        "[agent]\nmax_turns = 0",
        "[agent]\nmax_line_bytes = 0",
        "[sessions]\nmax_per_user = 0",
        "[agent]\nbinary = \"  \"",
    ] {
        let err = GlobalConfig::from_toml_str(raw).expect_err(raw);
        assert!(matches!(err, AppError::Config(_)), "{raw} must be a config error");
    }
}

/// Malformed TOML is a config error.
#[test]
fn invalid_toml_is_rejected() {
    let err = GlobalConfig::from_toml_str("[agent\nbinary=").expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref m) if m.starts_with("invalid config")));
}

/// A missing file is a config error.
#[test]
fn missing_file_is_rejected() {
    let err = GlobalConfig::load_from_path("/nonexistent/agent-relay/config.toml")
        .expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

// ── Environment overrides ────────────────────────────────────────────────────

/// Recognised keys override the loaded values.
#[test]
fn overrides_are_applied() {
    let mut config = GlobalConfig::default();
    config
        .apply_overrides(lookup(&[
            ("CLAUDE_BINARY_PATH", "/usr/local/bin/claude"),
            ("CLAUDE_TIMEOUT_SECONDS", "120"),
            ("CLAUDE_MAX_TURNS", "7"),
            ("CLAUDE_ALLOWED_TOOLS", "Read, Grep,,Bash"),
            ("CLAUDE_SKIP_PERMISSIONS", "FALSE"),
            ("CLAUDE_SESSION_TIMEOUT_HOURS", "1"),
            ("CLAUDE_MAX_SESSIONS_PER_USER", "9"),
        ]))
        .expect("overrides are valid");

    assert_eq!(config.agent.binary, "/usr/local/bin/claude");
    assert_eq!(config.agent.timeout_seconds, 120);
    assert_eq!(config.agent.max_turns, 7);
    assert_eq!(config.agent.allowed_tools, vec!["Read", "Grep", "Bash"]);
    assert!(!config.agent.skip_permissions);
    assert_eq!(config.sessions.timeout_hours, 1);
    assert_eq!(config.sessions.max_per_user, 9);
}

/// A non-numeric override names the offending key.
#[test]
fn invalid_override_names_key() {
    let mut config = GlobalConfig::default();
    let err = config
        .apply_overrides(lookup(&[("CLAUDE_MAX_TURNS", "many")]))
        .expect_err("must fail");
    assert!(
        matches!(err, AppError::Config(ref m) if m.contains("CLAUDE_MAX_TURNS")),
        "error must name the key, got {err}"
    );
}

/// Overrides are re-validated after being applied.
#[test]
fn overrides_are_revalidated() {
    let mut config = GlobalConfig::default();
    let err = config
        .apply_overrides(lookup(&[("CLAUDE_TIMEOUT_SECONDS", "0")]))
        .expect_err("zero timeout must be rejected");
    assert!(matches!(err, AppError::Config(_)));
}
