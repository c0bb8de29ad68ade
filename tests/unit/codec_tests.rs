//! Unit tests for the NDJSON frame codec.
//!
//! Covers:
//! - complete lines are returned without their newline
//! - partial lines stay buffered until the newline arrives
//! - oversized lines are reported once and the codec resynchronises
//! - the trailing unterminated line is flushed at EOF

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use agent_relay::stream::codec::{FrameCodec, FrameLine, DEFAULT_MAX_LINE_BYTES};

fn text(s: &str) -> Option<FrameLine> {
    Some(FrameLine::Text(s.to_owned()))
}

// ── Complete lines ───────────────────────────────────────────────────────────

/// Two lines in one buffer decode as two items, then the buffer is drained.
#[test]
fn batched_lines_are_each_decoded() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"a\"}\n{\"type\":\"b\"}\n");

    assert_eq!(codec.decode(&mut buf).expect("first"), text("{\"type\":\"a\"}"));
    assert_eq!(codec.decode(&mut buf).expect("second"), text("{\"type\":\"b\"}"));
    assert_eq!(
        codec.decode(&mut buf).expect("drained"),
        None,
        "an empty buffer must yield no item"
    );
}

/// Surrounding whitespace and a CRLF terminator are trimmed.
#[test]
fn lines_are_trimmed() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("  {\"a\":1}  \r\n");

    assert_eq!(codec.decode(&mut buf).expect("decode"), text("{\"a\":1}"));
}

/// Invalid UTF-8 is replaced rather than rejected.
#[test]
fn invalid_utf8_is_decoded_lossily() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&b"ab\xffcd\n"[..]);

    let Some(FrameLine::Text(line)) = codec.decode(&mut buf).expect("decode") else {
        panic!("expected a text line");
    };
    assert!(line.starts_with("ab") && line.ends_with("cd"));
    assert!(line.contains('\u{FFFD}'), "invalid byte must become U+FFFD");
}

// ── Partial delivery ─────────────────────────────────────────────────────────

/// A line split across two reads is returned only once complete.
#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("{\"type\":");

    assert_eq!(
        codec.decode(&mut buf).expect("partial"),
        None,
        "no item may be produced before the newline"
    );

    buf.extend_from_slice(b"\"system\"}\n");
    assert_eq!(
        codec.decode(&mut buf).expect("complete"),
        text("{\"type\":\"system\"}")
    );
}

// ── Oversized lines ──────────────────────────────────────────────────────────

/// An oversized line yields one `Oversized` item and the next line decodes.
#[test]
fn oversized_line_is_skipped_and_stream_resumes() {
    let mut codec = FrameCodec::with_max_length(8);
    let mut buf = BytesMut::from("0123456789abc\nok\n");

    assert_eq!(
        codec.decode(&mut buf).expect("oversized"),
        Some(FrameLine::Oversized { limit: 8 })
    );
    assert_eq!(
        codec.decode(&mut buf).expect("resync"),
        text("ok"),
        "the line after the oversized one must decode normally"
    );
}

/// An oversized unterminated tail is dropped at EOF without an extra item.
#[test]
fn oversized_tail_is_dropped_at_eof() {
    let mut codec = FrameCodec::with_max_length(4);
    let mut buf = BytesMut::from("0123456789");

    assert_eq!(
        codec.decode(&mut buf).expect("oversized"),
        Some(FrameLine::Oversized { limit: 4 })
    );
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), None);
    assert!(buf.is_empty(), "discarded bytes must be consumed");
}

// ── EOF ──────────────────────────────────────────────────────────────────────

/// A final line without a newline is flushed at EOF.
#[test]
fn trailing_line_is_flushed_at_eof() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("first\ntail");

    assert_eq!(codec.decode_eof(&mut buf).expect("first"), text("first"));
    assert_eq!(codec.decode_eof(&mut buf).expect("tail"), text("tail"));
    assert_eq!(codec.decode_eof(&mut buf).expect("done"), None);
}

/// The default limit is 8 MiB.
#[test]
fn default_limit_is_eight_mebibytes() {
    assert_eq!(FrameCodec::new().max_length(), DEFAULT_MAX_LINE_BYTES);
    assert_eq!(DEFAULT_MAX_LINE_BYTES, 8 * 1024 * 1024);
}
