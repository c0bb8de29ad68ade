//! Frame reader loop.
//!
//! Reads the agent's stdout through a [`FramedRead`] backed by
//! [`FrameCodec`], in reads of at most `chunk_bytes`, and folds every line
//! into a [`TurnAggregator`]. Live updates are handed to the caller's sink
//! through [`deliver_guarded`], so a failing sink never stops the loop.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::orchestrator::sink::{deliver_guarded, UpdateSink};
use crate::stream::aggregator::TurnAggregator;
use crate::stream::codec::{FrameCodec, FrameLine};

/// Build the lazy line stream over `stdout`.
///
/// The stream is finite and ends when `stdout` closes; a trailing
/// unterminated line is flushed at EOF.
pub fn frame_lines<R>(stdout: R, chunk_bytes: usize, max_line_bytes: usize) -> FramedRead<R, FrameCodec>
where
    R: AsyncRead,
{
    FramedRead::with_capacity(stdout, FrameCodec::with_max_length(max_line_bytes), chunk_bytes)
}

/// Drive `stdout` to EOF, feeding `aggregator` and delivering updates to
/// `sink`.
///
/// Oversized lines are counted and skipped. An I/O error on the stream ends
/// the loop; the caller still awaits the process exit and finalizes.
pub async fn pump_frames<R>(
    execution_id: &str,
    stdout: R,
    chunk_bytes: usize,
    max_line_bytes: usize,
    aggregator: &mut TurnAggregator,
    sink: &dyn UpdateSink,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = frame_lines(stdout, chunk_bytes, max_line_bytes);
    let mut delivered: u64 = 0;

    while let Some(item) = lines.next().await {
        match item {
            Ok(FrameLine::Text(line)) => {
                if let Some(update) = aggregator.ingest_line(&line) {
                    deliver_guarded(sink, update, execution_id).await;
                    delivered += 1;
                }
            }
            Ok(FrameLine::Oversized { limit }) => {
                aggregator.record_dropped_line();
                warn!(execution_id, limit, "frame exceeds line limit, skipping");
            }
            Err(err) => {
                warn!(execution_id, error = %err, "agent stdout read failed, stopping reader");
                break;
            }
        }
    }

    debug!(
        execution_id,
        delivered,
        summary = %aggregator.summary(),
        "agent stdout closed"
    );
}
