//! Caller-supplied destinations for live [`SemanticUpdate`]s.
//!
//! Delivery is fire-and-forget from the reader's point of view:
//! [`deliver_guarded`] absorbs returned errors and panics, whether raised
//! while building the delivery future or while polling it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::update::SemanticUpdate;
use crate::{AppError, Result};

/// Destination for live updates of one execution.
pub trait UpdateSink: Send + Sync {
    /// Deliver one update.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the failure is logged and the stream
    /// continues.
    fn deliver(
        &self,
        update: SemanticUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sink that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn deliver(
        &self,
        _update: SemanticUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

impl UpdateSink for mpsc::Sender<SemanticUpdate> {
    fn deliver(
        &self,
        update: SemanticUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.send(update)
                .await
                .map_err(|_| AppError::Io("update receiver closed".into()))
        })
    }
}

/// Deliver `update` to `sink`, logging and swallowing any failure.
pub async fn deliver_guarded(sink: &dyn UpdateSink, update: SemanticUpdate, execution_id: &str) {
    let kind = update.kind;
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(update))) {
        Ok(future) => future,
        Err(_) => {
            warn!(execution_id, ?kind, "update sink panicked, update dropped");
            return;
        }
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(execution_id, ?kind, error = %err, "update sink failed, update dropped");
        }
        Err(_) => {
            warn!(execution_id, ?kind, "update sink panicked, update dropped");
        }
    }
}
