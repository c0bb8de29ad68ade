//! Classification of non-zero agent exits.
//!
//! Standard error is matched case-insensitively against known phrase
//! families. Authentication and usage-limit failures become
//! [`AppError::Process`] with the matching [`ProcessFailureKind`]; a rejected
//! continuity id becomes [`AppError::Session`] so callers can retry fresh.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{ProcessFailure, ProcessFailureKind};
use crate::AppError;

const AUTH_PHRASES: &[&str] = &[
    "not authenticated",
    "authentication failed",
    "please run 'claude setup-token'",
    "no valid token found",
];

const SESSION_PHRASES: &[&str] = &[
    "session not found",
    "invalid session",
    "session expired",
    "could not resume",
];

const USAGE_LIMIT_PHRASE: &str = "usage limit reached";

/// Classify a failed agent run from its exit code and standard error.
#[must_use]
pub fn classify_exit(exit_code: Option<i32>, stderr: &str) -> AppError {
    let lowered = stderr.to_lowercase();

    if AUTH_PHRASES.iter().any(|p| lowered.contains(p)) {
        return AppError::Process(ProcessFailure {
            kind: ProcessFailureKind::Authentication,
            exit_code,
            stderr: stderr.to_owned(),
        });
    }

    if SESSION_PHRASES.iter().any(|p| lowered.contains(p)) {
        return AppError::Session(format!("continuity id rejected: {}", stderr.trim()));
    }

    if lowered.contains(USAGE_LIMIT_PHRASE) {
        let (reset_at, timezone) = parse_reset_time(stderr);
        return AppError::Process(ProcessFailure {
            kind: ProcessFailureKind::UsageLimit { reset_at, timezone },
            exit_code,
            stderr: stderr.to_owned(),
        });
    }

    AppError::Process(ProcessFailure {
        kind: ProcessFailureKind::Generic,
        exit_code,
        stderr: stderr.to_owned(),
    })
}

static RESET_AT: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)reset at (\d+[apm]+)"));

static TIMEZONE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\(([^)]+)\)"));

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|err| tracing::warn!(pattern, error = %err, "invalid exit classification regex"))
        .ok()
}

/// Extract `reset at <H><am|pm>` and the first parenthesised group.
fn parse_reset_time(stderr: &str) -> (Option<String>, Option<String>) {
    let capture = |re: &LazyLock<Option<Regex>>| {
        LazyLock::force(re)
            .as_ref()
            .and_then(|re| re.captures(stderr))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    };
    (capture(&RESET_AT), capture(&TIMEZONE))
}
