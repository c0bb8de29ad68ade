//! Per-execution aggregation of the frame stream into an [`ExecutionResult`].
//!
//! [`TurnAggregator`] is the sequential consumer for one execution: each line
//! is parsed, folded into the [`ToolCorrelator`], recorded in a bounded
//! history of frame kinds, and classified into an optional live update. The
//! terminal `result` frame is captured instead of delivered.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::execution::ExecutionResult;
use crate::models::update::SemanticUpdate;
use crate::stream::classifier::classify;
use crate::stream::correlation::ToolCorrelator;
use crate::stream::frame::{parse_frame, Frame, FrameKind, ResultFrame};
use crate::{AppError, Result};

/// Number of trailing frame kinds quoted in diagnostics.
const SUMMARY_TAIL: usize = 10;

/// Consumer state for one execution's frame stream.
#[derive(Debug)]
pub struct TurnAggregator {
    correlator: ToolCorrelator,
    result: Option<ResultFrame>,
    history: VecDeque<FrameKind>,
    history_limit: usize,
    frames_seen: u64,
    malformed: u64,
}

impl TurnAggregator {
    /// Create an aggregator.
    ///
    /// `subtask_tool` names the delegated sub-task tool; `history_limit`
    /// bounds the retained frame-kind history (correlation is unaffected).
    #[must_use]
    pub fn new(subtask_tool: impl Into<String>, history_limit: usize) -> Self {
        Self {
            correlator: ToolCorrelator::new(subtask_tool),
            result: None,
            history: VecDeque::with_capacity(history_limit.min(64)),
            history_limit,
            frames_seen: 0,
            malformed: 0,
        }
    }

    /// Parse and fold one raw line.
    ///
    /// Malformed lines are counted and logged, never propagated.
    pub fn ingest_line(&mut self, line: &str) -> Option<SemanticUpdate> {
        match parse_frame(line) {
            Ok(Some(frame)) => self.ingest_frame(&frame),
            Ok(None) => None,
            Err(err) => {
                self.malformed += 1;
                warn!(error = %err, line_len = line.len(), "skipping malformed frame");
                None
            }
        }
    }

    /// Fold one parsed frame and return its live update, if any.
    pub fn ingest_frame(&mut self, frame: &Frame) -> Option<SemanticUpdate> {
        self.frames_seen += 1;
        self.correlator.observe(frame);
        self.remember(frame.kind());

        if let Frame::Result(result) = frame {
            debug!(
                is_error = result.is_error,
                session_id = result.session_id.as_deref().unwrap_or_default(),
                "captured terminal result frame"
            );
            self.result = Some(result.clone());
        }
        classify(frame)
    }

    /// Count a line dropped by the framing layer.
    pub fn record_dropped_line(&mut self) {
        self.malformed += 1;
    }

    /// Number of malformed or dropped lines so far.
    #[must_use]
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Number of structurally valid frames so far.
    #[must_use]
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Whether the terminal `result` frame has been observed.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Retained frame kinds, oldest first.
    pub fn recent_kinds(&self) -> impl Iterator<Item = &FrameKind> {
        self.history.iter()
    }

    /// Short description of the stream for logs and failure messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let skip = self.history.len().saturating_sub(SUMMARY_TAIL);
        let tail: Vec<&str> = self.history.iter().skip(skip).map(FrameKind::as_str).collect();
        format!(
            "{} frames, {} malformed, last kinds [{}]",
            self.frames_seen,
            self.malformed,
            tail.join(", ")
        )
    }

    /// Build the final result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parsing` if no `result` frame was observed.
    pub fn finish(self, call_log: Vec<Value>) -> Result<ExecutionResult> {
        let summary = self.summary();
        let Some(frame) = self.result else {
            return Err(AppError::Parsing(format!(
                "stream ended without a result frame ({summary})"
            )));
        };

        let cost_usd = frame.cost();
        let error_kind = if frame.is_error {
            frame.subtype.clone()
        } else {
            None
        };
        Ok(ExecutionResult {
            content: frame.result.unwrap_or_default(),
            session_id: frame.session_id.unwrap_or_default(),
            cost_usd,
            duration_ms: frame.duration_ms.unwrap_or(0),
            num_turns: frame.num_turns.unwrap_or(0),
            is_error: frame.is_error,
            error_kind,
            tools_used: self.correlator.finish(),
            call_log,
        })
    }

    fn remember(&mut self, kind: FrameKind) {
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(kind);
    }
}
