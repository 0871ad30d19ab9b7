//! The caller-facing cancellable handle and the cooperative cancel token.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use courier_store::EntryId;
use tokio::sync::oneshot;

use crate::{
    engine::DispatchEngine,
    error::{DispatchError, SystemError},
    transport::TransportId,
};

/// Cooperative cancellation token.
///
/// Checked by the delivery task at defined checkpoints (pre-claim and
/// post-send). Cancelling while the transport call is in flight latches the
/// request; the task honors it right after the call returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; never un-latches.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Final outcome of one enqueued message, delivered through its handle.
///
/// Mid-flight retries are invisible to the caller except through elapsed
/// time; only the terminal outcome crosses this boundary.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Delivered; carries the transport's message id.
    Delivered(TransportId),
    /// Terminally failed (budget exhausted, permanent, or system error).
    Failed(DispatchError),
    /// Cancelled by the caller before a delivery took effect — or, for a
    /// cancel latched during the send window, even if it did.
    Cancelled,
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Cancellable handle to one enqueued message.
///
/// Returned by [`DispatchEngine::enqueue`]; resolves once the entry reaches
/// a terminal state on this node. Dropping the handle does not cancel the
/// dispatch.
#[derive(Debug)]
pub struct DispatchHandle {
    entry_id: EntryId,
    engine: Arc<DispatchEngine>,
    receiver: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchHandle {
    pub(crate) const fn new(
        entry_id: EntryId,
        engine: Arc<DispatchEngine>,
        receiver: oneshot::Receiver<DispatchOutcome>,
    ) -> Self {
        Self {
            entry_id,
            engine,
            receiver,
        }
    }

    /// The durable id of the underlying queue entry.
    #[must_use]
    pub const fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }

    /// Request cancellation.
    ///
    /// Takes effect immediately when no attempt is in flight; otherwise the
    /// request is latched and honored at the task's next checkpoint. A send
    /// already past its uncancellable point still archives as cancelled.
    ///
    /// # Errors
    /// Returns an error if the cancel-archival itself hits a persistence
    /// failure.
    pub async fn cancel(&self) -> Result<(), DispatchError> {
        self.engine.cancel(&self.entry_id).await
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> DispatchOutcome {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome::Failed(
                SystemError::Internal("outcome channel closed before resolution".to_string())
                    .into(),
            ),
        }
    }
}
