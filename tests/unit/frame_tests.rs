//! Unit tests for frame parsing and the per-kind schemas.

use serde_json::json;

use agent_relay::stream::frame::{
    parse_frame, ContentBlock, Frame, FrameKind, ResultContent,
};
use agent_relay::AppError;

fn parse(line: &str) -> Frame {
    parse_frame(line)
        .expect("line must parse")
        .expect("line must yield a frame")
}

// ── Envelope validation ──────────────────────────────────────────────────────

/// Empty and whitespace-only lines are skipped.
#[test]
fn blank_lines_yield_no_frame() {
    assert!(parse_frame("").expect("empty").is_none());
    assert!(parse_frame("   \t").expect("blank").is_none());
}

/// Text that is not JSON is a frame error.
#[test]
fn non_json_is_rejected() {
    let err = parse_frame("not-json").expect_err("must fail");
    assert!(matches!(err, AppError::Frame(ref m) if m.starts_with("malformed json")));
}

/// JSON without a string `type` discriminator is rejected.
#[test]
fn missing_or_non_string_discriminator_is_rejected() {
    for line in [r#"{"message":{}}"#, r#"{"type":5}"#, "[1,2]", "42"] {
        let err = parse_frame(line).expect_err(line);
        assert!(
            matches!(err, AppError::Frame(ref m) if m.starts_with("invalid frame")),
            "{line} must be an invalid frame, got {err}"
        );
    }
}

/// An unknown discriminator parses into the explicit unrecognized case.
#[test]
fn unknown_discriminator_is_unrecognized() {
    let frame = parse(r#"{"type":"telemetry","value":1}"#);
    assert_eq!(frame, Frame::Unrecognized("telemetry".into()));
    assert_eq!(frame.kind().as_str(), "telemetry");
}

/// A known kind whose body violates its schema is rejected.
#[test]
fn schema_violation_is_rejected() {
    let err = parse_frame(r#"{"type":"progress","percentage":"half"}"#).expect_err("must fail");
    assert!(matches!(err, AppError::Frame(ref m) if m.contains("progress")));
}

// ── Per-kind schemas ─────────────────────────────────────────────────────────

/// Assistant frames expose text and tool-use segments in order.
#[test]
fn assistant_frame_segments() {
    let frame = parse(
        &json!({
            "type": "assistant",
            "message": {
                "id": "msg_1",
                "content": [
                    {"type": "text", "text": "looking"},
                    {"type": "tool_use", "id": "t1", "name": "Read"},
                    {"type": "thinking", "thinking": "hmm"}
                ]
            }
        })
        .to_string(),
    );

    let Frame::Assistant(msg) = frame else {
        panic!("expected assistant frame");
    };
    assert_eq!(msg.message_id(), Some("msg_1"));
    let blocks: Vec<&ContentBlock> = msg.message.content.blocks().collect();
    assert_eq!(blocks.len(), 3);
    assert_eq!(
        blocks[1],
        &ContentBlock::ToolUse {
            id: Some("t1".into()),
            name: Some("Read".into()),
            input: json!({}),
        },
        "absent tool input defaults to an empty object"
    );
    assert_eq!(blocks[2], &ContentBlock::Other);
}

/// The top-level frame id takes precedence over the message id.
#[test]
fn frame_id_precedes_message_id() {
    let Frame::Assistant(msg) = parse(r#"{"type":"assistant","id":"f1","message":{"id":"m1"}}"#)
    else {
        panic!("expected assistant frame");
    };
    assert_eq!(msg.message_id(), Some("f1"));
}

/// Tool-result segment lists render their text segments joined by newlines.
#[test]
fn tool_result_segments_render_as_text() {
    let content = ResultContent::Segments(vec![
        json!({"type": "text", "text": "line one"}),
        json!({"type": "image", "source": {}}),
        json!({"type": "text", "text": "line two"}),
    ]);
    assert_eq!(content.to_text(), "line one\nline two");
    assert_eq!(ResultContent::Text("plain".into()).to_text(), "plain");
    assert_eq!(ResultContent::Other(json!(7)).to_text(), "7");
}

/// Result frames accept either cost field name.
#[test]
fn result_frame_cost_aliases() {
    let Frame::Result(older) = parse(r#"{"type":"result","cost_usd":0.5}"#) else {
        panic!("expected result frame");
    };
    let Frame::Result(newer) =
        parse(r#"{"type":"result","total_cost_usd":0.25,"num_turns":3,"session_id":"s"}"#)
    else {
        panic!("expected result frame");
    };
    assert!((older.cost() - 0.5).abs() < f64::EPSILON);
    assert!((newer.cost() - 0.25).abs() < f64::EPSILON);
    assert_eq!(newer.num_turns, Some(3));
    assert!(!newer.is_error, "is_error defaults to false");
}

/// Every known discriminator maps to its own kind.
#[test]
fn known_discriminators_map_to_kinds() {
    let cases = [
        ("assistant", FrameKind::Assistant),
        ("user", FrameKind::User),
        ("system", FrameKind::System),
        ("tool_result", FrameKind::ToolResult),
        ("error", FrameKind::Error),
        ("progress", FrameKind::Progress),
        ("result", FrameKind::Result),
    ];
    for (name, kind) in cases {
        let frame = parse(&format!(r#"{{"type":"{name}"}}"#));
        assert_eq!(frame.kind(), kind, "{name}");
        assert_eq!(kind.as_str(), name);
    }
}
