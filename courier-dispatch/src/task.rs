//! One delivery attempt for one queue entry.
//!
//! A [`DeliveryTask`] runs claim -> resolve -> send -> resolve-outcome ->
//! archive. Cancellation is cooperative: the task checks its token at the
//! pre-claim and post-send checkpoints. The transport call itself is the
//! uncancellable window; a cancel arriving inside it is latched and honored
//! right after, archiving the entry as cancelled even if the wire send
//! succeeded.

use std::sync::Arc;
use std::time::SystemTime;

use courier_common::{EntryState, QueueEntry};
use courier_store::{EntryId, Folder};
use tracing::{debug, error, info, warn};

use crate::{
    engine::DispatchEngine,
    error::{DispatchError, SystemError},
    handle::{CancelToken, DispatchOutcome},
    transport::OutboundMessage,
};

#[derive(Debug)]
pub(crate) struct DeliveryTask {
    engine: Arc<DispatchEngine>,
    id: EntryId,
    cancel: CancelToken,
}

impl DeliveryTask {
    pub(crate) const fn new(engine: Arc<DispatchEngine>, id: EntryId, cancel: CancelToken) -> Self {
        Self { engine, id, cancel }
    }

    /// Run the task to completion under the engine's concurrency limit.
    pub(crate) async fn run(self) {
        let permit = match Arc::clone(&self.engine.limiter).acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore closed: the engine is being torn down
            Err(_) => {
                self.engine.finish_task(&self.id);
                return;
            }
        };

        if let Err(e) = self.execute().await {
            error!(entry_id = %self.id, error = %e, "Delivery task failed");
        }

        drop(permit);
        self.engine.finish_task(&self.id);
    }

    async fn execute(&self) -> Result<(), DispatchError> {
        // Pre-claim checkpoint: honor a cancel or a shutdown before any
        // persisted side effect.
        if self.cancel.is_cancelled() {
            return self
                .finish(EntryState::Cancelled, DispatchOutcome::Cancelled)
                .await;
        }

        if !self.engine.is_enabled() {
            debug!(entry_id = %self.id, "Engine disabled before claim, entry stays queued");
            return Ok(());
        }

        let Some(mut entry) = self.claim().await? else {
            return Ok(());
        };

        // Resolve connection parameters fresh; configuration changes between
        // attempts are picked up here. Resolution failure is non-retryable.
        let params = match self.engine.resolve_params(&entry.server_config).await {
            Ok(params) => params,
            Err(e) => {
                warn!(
                    entry_id = %self.id,
                    logging_id = %entry.logging_id,
                    server_config = %entry.server_config,
                    error = %e,
                    "Server configuration unresolvable, failing entry"
                );
                let reason = e.to_string();
                return self
                    .finish(EntryState::Failed { reason }, DispatchOutcome::Failed(e))
                    .await;
            }
        };

        // Pre-send checkpoint.
        if !self.engine.is_enabled() {
            return self.release_claim(entry).await;
        }

        if self.cancel.is_cancelled() {
            return self
                .finish(EntryState::Cancelled, DispatchOutcome::Cancelled)
                .await;
        }

        // The send window is uncancellable by construction: the token is
        // consulted only at the checkpoints around the transport call, so a
        // cancel arriving from here on is latched, not applied.
        let mut message = OutboundMessage::new(entry.logging_id.clone(), Arc::clone(&entry.message));
        message.credential_token = entry.credential_token.clone();

        let result = self.engine.timed_send(&message, &params).await;

        // Post-send checkpoint: a latched cancel wins over the send result.
        if self.cancel.is_cancelled() {
            if let Ok(transport_id) = &result {
                warn!(
                    entry_id = %self.id,
                    logging_id = %entry.logging_id,
                    transport_id = %transport_id,
                    "Cancelled during send, message went out on the wire but archives as cancelled"
                );
            }
            return self
                .finish(EntryState::Cancelled, DispatchOutcome::Cancelled)
                .await;
        }

        match result {
            Ok(transport_id) => {
                info!(
                    entry_id = %self.id,
                    logging_id = %entry.logging_id,
                    transport_id = %transport_id,
                    retries = entry.retry_count,
                    "Message delivered"
                );
                self.finish(EntryState::Sent, DispatchOutcome::Delivered(transport_id))
                    .await
            }
            // A shutdown overlapping the send must not turn a transient
            // failure terminal: the reschedule is persisted regardless and
            // picked up again after a restart.
            Err(e)
                if e.is_temporary()
                    && self.engine.retry_policy().should_retry(entry.retry_count) =>
            {
                entry.retry_count += 1;
                entry.next_try = Some(self.engine.retry_policy().next_retry(entry.retry_count));
                entry.state = EntryState::Queued;

                match self
                    .engine
                    .store()
                    .update(Folder::Queue, &self.id, &entry)
                    .await
                {
                    Ok(()) => {
                        info!(
                            entry_id = %self.id,
                            logging_id = %entry.logging_id,
                            retry_count = entry.retry_count,
                            remaining = self.engine.retry_policy().remaining_retries(entry.retry_count),
                            error = %e,
                            "Transient delivery failure, rescheduled"
                        );
                        // The caller's handle stays pending until a later
                        // attempt reaches a terminal state.
                        Ok(())
                    }
                    Err(store_err) => {
                        // The reschedule cannot be persisted; fall back to a
                        // terminal failure rather than losing track silently.
                        error!(
                            entry_id = %self.id,
                            error = %store_err,
                            "Failed to persist reschedule, failing entry"
                        );
                        let reason = format!("{e} (reschedule failed: {store_err})");
                        self.finish(EntryState::Failed { reason }, DispatchOutcome::Failed(e))
                            .await
                    }
                }
            }
            Err(e) => {
                warn!(
                    entry_id = %self.id,
                    logging_id = %entry.logging_id,
                    retries = entry.retry_count,
                    error = %e,
                    "Delivery failed terminally"
                );
                let reason = e.to_string();
                self.finish(EntryState::Failed { reason }, DispatchOutcome::Failed(e))
                    .await
            }
        }
    }

    /// Claim the entry for this attempt.
    ///
    /// Re-reads the entry and verifies ownership before committing the claim;
    /// a scan on another node may have overwritten the owner since this task
    /// was started. Returns `None` when the attempt should abort without side
    /// effects.
    async fn claim(&self) -> Result<Option<QueueEntry>, DispatchError> {
        let mut entry = match self.engine.store().read(Folder::Queue, &self.id).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                // Archived or deleted since the task was started
                debug!(entry_id = %self.id, "Entry gone before claim");
                return Ok(None);
            }
            Err(e) => return self.fail(SystemError::StoreRead(e.to_string()).into()).await,
        };

        if entry.owner != *self.engine.node() {
            debug!(
                entry_id = %self.id,
                owner = %entry.owner,
                "Lost claim race to another node, aborting attempt"
            );
            return Ok(None);
        }

        match entry.state {
            EntryState::Queued => {}
            EntryState::Sending => {
                warn!(entry_id = %self.id, "Entry already claimed, aborting attempt");
                return Ok(None);
            }
            _ => {
                // A terminal entry still in the queue folder is a defect
                error!(
                    entry_id = %self.id,
                    state = %entry.state,
                    "Terminal entry found in queue folder"
                );
                let detail = format!("terminal state {} found in queue folder", entry.state);
                self.finish(
                    EntryState::InternalError {
                        detail: detail.clone(),
                    },
                    DispatchOutcome::Failed(SystemError::Inconsistent(detail).into()),
                )
                .await?;
                return Ok(None);
            }
        }

        // Commit the claim: `Sending` plus an unset `next_try` makes the
        // entry invisible to every node's retry scan.
        entry.state = EntryState::Sending;
        entry.next_try = None;

        if let Err(e) = self
            .engine
            .store()
            .update(Folder::Queue, &self.id, &entry)
            .await
        {
            return self
                .fail(SystemError::StoreWrite(e.to_string()).into())
                .await;
        }

        debug!(
            entry_id = %self.id,
            logging_id = %entry.logging_id,
            attempt = entry.retry_count + 1,
            "Claimed entry for delivery"
        );

        Ok(Some(entry))
    }

    /// Put a claimed entry back into the queue, due immediately.
    ///
    /// Used when the engine is disabled between claim and send; the entry is
    /// picked up again after a restart.
    async fn release_claim(&self, mut entry: QueueEntry) -> Result<(), DispatchError> {
        entry.state = EntryState::Queued;
        entry.next_try = Some(SystemTime::now());

        if let Err(e) = self
            .engine
            .store()
            .update(Folder::Queue, &self.id, &entry)
            .await
        {
            warn!(entry_id = %self.id, error = %e, "Failed to release claim during shutdown");
        } else {
            debug!(entry_id = %self.id, "Engine disabled, released claim back to queue");
        }

        Ok(())
    }

    /// Archive the entry into `final_state` and complete the caller's handle.
    ///
    /// An archival failure still resolves the handle: a latched cancel is
    /// reported as cancelled regardless, anything else as failed.
    async fn finish(
        &self,
        final_state: EntryState,
        outcome: DispatchOutcome,
    ) -> Result<(), DispatchError> {
        match self.engine.archive_entry(&self.id, final_state).await {
            Ok(()) => {
                self.engine.resolve_outcome(&self.id, outcome);
                Ok(())
            }
            Err(e) => {
                error!(entry_id = %self.id, error = %e, "Failed to archive terminal entry");
                if outcome.is_cancelled() {
                    self.engine
                        .resolve_outcome(&self.id, DispatchOutcome::Cancelled);
                } else {
                    self.engine
                        .resolve_outcome(&self.id, DispatchOutcome::Failed(e));
                }
                Ok(())
            }
        }
    }

    /// Report a claim-phase persistence failure to the caller's handle.
    ///
    /// No archival is attempted; the store just demonstrated it cannot be
    /// written to, and the entry is picked up again by a later scan.
    async fn fail<T>(&self, error: DispatchError) -> Result<Option<T>, DispatchError> {
        error!(entry_id = %self.id, error = %error, "Persistence failure during claim");
        self.engine
            .resolve_outcome(&self.id, DispatchOutcome::Failed(error));
        Ok(None)
    }
}
