//! NDJSON codec for agent stdout streams.
//!
//! Splits the byte stream on `\n` with a configurable maximum line length so
//! an unterminated or oversized frame cannot make the reader buffer without
//! bound. Unlike [`tokio_util::codec::LinesCodec`], an oversized line is not a
//! decoder error: it is discarded up to the next newline and reported as
//! [`FrameLine::Oversized`], so the surrounding [`FramedRead`] keeps
//! producing frames afterwards. Bytes are decoded lossily as UTF-8.
//!
//! [`FramedRead`]: tokio_util::codec::FramedRead

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Default maximum line length accepted by [`FrameCodec`]: 8 MiB.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// One decoded unit of the agent stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLine {
    /// A complete line, trimmed, without its terminating newline.
    Text(String),
    /// A line exceeded the limit and was dropped.
    Oversized {
        /// Limit that was exceeded.
        limit: usize,
    },
}

/// Newline-delimited frame decoder with a hard per-line limit.
#[derive(Debug)]
pub struct FrameCodec {
    max_length: usize,
    /// Offset already scanned for a newline in the current buffer.
    next_index: usize,
    /// Dropping bytes until the next newline after an oversized line.
    is_discarding: bool,
}

impl FrameCodec {
    /// Codec with the default [`DEFAULT_MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_BYTES)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            is_discarding: false,
        }
    }

    /// Maximum accepted line length in bytes.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = FrameLine;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` while `src` holds only a partial line.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrameLine>> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.is_discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.is_discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    return Ok(Some(FrameLine::Text(decode_line(&line[..end]))));
                }
                (false, None) if src.len() > self.max_length => {
                    self.is_discarding = true;
                    return Ok(Some(FrameLine::Oversized {
                        limit: self.max_length,
                    }));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    /// Decode the final, possibly unterminated, line at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<FrameLine>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if self.is_discarding {
            src.clear();
            self.is_discarding = false;
            return Ok(None);
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(FrameLine::Text(decode_line(&rest))))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}
