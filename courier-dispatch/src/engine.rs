//! The dispatch engine facade.
//!
//! Accepts new messages, creates and tracks delivery tasks, periodically
//! scans for due retries, and enforces enabled/disabled and shutdown
//! semantics. Multiple engines (one per worker node) may share one record
//! store; claiming is optimistic, not locked, so cross-node double-claims
//! are probabilistically reduced rather than eliminated.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use courier_common::{ConfigRef, EntryState, NodeId, QueueEntry, Signal, internal};
use courier_store::{EntryId, Folder, RecordStore};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::{Semaphore, broadcast, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    error::{DispatchError, PermanentError, SystemError, TemporaryError},
    handle::{CancelToken, DispatchHandle, DispatchOutcome},
    policy::{CleanupPolicy, RetryPolicy},
    task::DeliveryTask,
    transport::{ConfigResolver, ConnectionParams, OutboundMessage, Transport, TransportId},
};

const fn default_scan_interval() -> u64 {
    30
}

const fn default_max_concurrent() -> usize {
    8
}

const fn default_send_timeout() -> u64 {
    300
}

const fn default_shutdown_grace() -> u64 {
    30
}

const fn default_dispatch_immediately() -> bool {
    true
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// How often the serve loop scans for due retries (in seconds)
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Maximum number of simultaneous in-flight sends on this node
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sends: usize,

    /// Upper bound on one transport send call (in seconds)
    ///
    /// The transport call is the only long-blocking operation; elapsing this
    /// timeout classifies as a temporary failure. True mid-send abort is not
    /// guaranteed beyond this bound.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Delay between enqueue and first eligibility (in seconds)
    #[serde(default)]
    pub initial_delay_secs: u64,

    /// Start a delivery task right at enqueue time when the initial delay
    /// is zero, instead of waiting for the next scan
    #[serde(default = "default_dispatch_immediately")]
    pub dispatch_immediately: bool,

    /// How long shutdown waits for in-flight deliveries (in seconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Retry budget and reschedule delays
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Keep-vs-delete decision for terminal entries
    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            max_concurrent_sends: default_max_concurrent(),
            send_timeout_secs: default_send_timeout(),
            initial_delay_secs: 0,
            dispatch_immediately: default_dispatch_immediately(),
            shutdown_grace_secs: default_shutdown_grace(),
            retry: RetryPolicy::default(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// The dispatch engine.
///
/// Create one per worker node via [`DispatchEngine::new`]; share it as an
/// `Arc`. All methods are safe to call concurrently.
#[derive(Debug)]
pub struct DispatchEngine {
    config: DispatchConfig,
    node: NodeId,
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn ConfigResolver>,
    enabled: AtomicBool,
    /// Cancel tokens for the delivery tasks currently running on this node.
    /// The uncancellable send window needs no flag here: tasks consult their
    /// token only at the checkpoints around the transport call.
    inflight: DashMap<EntryId, CancelToken>,
    /// Outcome channels for handles issued by this node. Entries resolved by
    /// another node are swept out at scan time so handles cannot leak.
    pending: DashMap<EntryId, oneshot::Sender<DispatchOutcome>>,
    /// Bounds the number of simultaneous in-flight sends.
    pub(crate) limiter: Arc<Semaphore>,
}

impl DispatchEngine {
    /// Create an engine with a freshly generated node identity.
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ConfigResolver>,
    ) -> Arc<Self> {
        Self::with_node(NodeId::generate(), config, store, transport, resolver)
    }

    /// Create an engine with an explicit node identity.
    ///
    /// Useful in tests that simulate several cooperating nodes against one
    /// shared store.
    #[must_use]
    pub fn with_node(
        node: NodeId,
        config: DispatchConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ConfigResolver>,
    ) -> Arc<Self> {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_sends.max(1)));

        Arc::new(Self {
            config,
            node,
            store,
            transport,
            resolver,
            enabled: AtomicBool::new(true),
            inflight: DashMap::new(),
            pending: DashMap::new(),
            limiter,
        })
    }

    /// This engine's node identity.
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// Whether the engine accepts and processes work.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of delivery tasks currently running on this node.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Disable the engine.
    ///
    /// In-flight and about-to-start tasks observe disablement and abort
    /// cleanly before their transport send; a send already past its
    /// uncancellable point is not interrupted.
    pub fn shutdown(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            internal!(level = INFO, "Dispatch engine disabled");
        }
    }

    /// Persist a new entry and return a cancellable handle for its outcome.
    ///
    /// The entry becomes eligible after the configured initial delay; with a
    /// zero delay (and `dispatch_immediately`) a delivery task starts right
    /// away, otherwise the next retry scan picks it up.
    ///
    /// # Errors
    /// Returns an error if the engine is disabled or the entry cannot be
    /// persisted.
    pub async fn enqueue(
        self: &Arc<Self>,
        message: OutboundMessage,
        server_config: ConfigRef,
    ) -> Result<DispatchHandle, DispatchError> {
        if !self.is_enabled() {
            return Err(SystemError::Disabled.into());
        }

        let mut entry = QueueEntry::new(
            message.logging_id,
            message.body,
            server_config,
            message.credential_token,
            self.node.clone(),
        );
        entry.next_try =
            Some(SystemTime::now() + Duration::from_secs(self.config.initial_delay_secs));

        let id = self
            .store
            .create(Folder::Queue, &mut entry)
            .await
            .map_err(|e| SystemError::StoreWrite(e.to_string()))?;

        debug!(
            logging_id = %entry.logging_id,
            entry_id = %id,
            "Enqueued message for dispatch"
        );

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        if self.config.dispatch_immediately && self.config.initial_delay_secs == 0 {
            self.start_task(id.clone());
        }

        Ok(DispatchHandle::new(id, Arc::clone(self), rx))
    }

    /// Attempt delivery synchronously, bypassing persistence entirely.
    ///
    /// Used when at-least-once semantics are not required and synchronous
    /// failure reporting is preferred: any failure raises immediately, no
    /// retry, and no durable trace is left.
    ///
    /// # Errors
    /// Returns the classified delivery error on any failure.
    pub async fn send_immediately(
        &self,
        message: &OutboundMessage,
        server_config: &ConfigRef,
    ) -> Result<TransportId, DispatchError> {
        if !self.is_enabled() {
            return Err(SystemError::Disabled.into());
        }

        let params = self.resolve_params(server_config).await?;

        debug!(
            logging_id = %message.logging_id,
            server = %params.address(),
            "Sending message without queueing"
        );

        self.timed_send(message, &params).await
    }

    /// Scan the queue for due entries and start delivery tasks for them.
    ///
    /// Safe to run concurrently with other nodes' scans: taking over a due
    /// entry is a last-writer-wins commit, and the task's claim step
    /// re-checks ownership before any side effects.
    ///
    /// Returns the number of tasks started.
    ///
    /// # Errors
    /// Returns an error if the queue folder cannot be listed.
    pub async fn retry_scan(self: &Arc<Self>) -> Result<usize, DispatchError> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let ids = self
            .store
            .list(Folder::Queue)
            .await
            .map_err(|e| SystemError::StoreRead(e.to_string()))?;

        let now = SystemTime::now();
        let mut started = 0;

        for id in ids {
            if self.inflight.contains_key(&id) {
                continue;
            }

            let mut entry = match self.store.read(Folder::Queue, &id).await {
                Ok(entry) => entry,
                // Archived or deleted between list and read
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(entry_id = %id, error = %e, "Failed to read queue entry during scan");
                    continue;
                }
            };

            match entry.state {
                EntryState::Queued => {}
                EntryState::Sending => {
                    if entry.owner != self.node {
                        warn!(
                            entry_id = %id,
                            logging_id = %entry.logging_id,
                            owner = %entry.owner,
                            "Entry is sending on another node; orphaned claim if that node died"
                        );
                    }
                    continue;
                }
                _ => continue,
            }

            if !entry.is_due(now) {
                continue;
            }

            if entry.owner != self.node {
                // Take the entry over: last-writer-wins. The task re-checks
                // ownership at claim time and aborts if another node's scan
                // overwrote this commit.
                entry.owner = self.node.clone();
                if let Err(e) = self.store.update(Folder::Queue, &id, &entry).await {
                    warn!(entry_id = %id, error = %e, "Failed to take ownership of due entry");
                    continue;
                }
            }

            self.start_task(id);
            started += 1;
        }

        self.sweep_pending().await;

        Ok(started)
    }

    /// Complete handles whose entries left the queue without this node's
    /// involvement.
    ///
    /// Another node can take over and terminally resolve an entry enqueued
    /// here; the local outcome channel would otherwise wait forever. A
    /// cancel archive is reported as cancelled; any other foreign resolution
    /// surfaces as a system error, since the wire-level outcome is not
    /// knowable from this side.
    async fn sweep_pending(&self) {
        let ids: Vec<EntryId> = self.pending.iter().map(|entry| entry.key().clone()).collect();

        for id in ids {
            if self.inflight.contains_key(&id) {
                continue;
            }

            match self.store.read(Folder::Queue, &id).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {}
                // Store trouble is the scan's problem, not the sweep's
                Err(_) => continue,
            }

            let outcome = match self.store.read(Folder::Cancelled, &id).await {
                Ok(_) => DispatchOutcome::Cancelled,
                Err(_) => DispatchOutcome::Failed(
                    SystemError::Internal(
                        "entry reached a terminal state on another node".to_string(),
                    )
                    .into(),
                ),
            };

            warn!(entry_id = %id, "Entry left the queue outside this node, completing its handle");
            self.resolve_outcome(&id, outcome);
        }
    }

    /// Request cancellation of an entry.
    ///
    /// With a task in flight on this node the request is latched onto its
    /// cancel token and honored at the task's next checkpoint. Otherwise the
    /// entry is archived as cancelled immediately.
    ///
    /// # Errors
    /// Returns an error if the immediate cancel-archival hits a persistence
    /// failure.
    pub async fn cancel(&self, id: &EntryId) -> Result<(), DispatchError> {
        if let Some(token) = self.inflight.get(id) {
            token.cancel();
            debug!(entry_id = %id, "Cancellation latched onto in-flight task");
            return Ok(());
        }

        let entry = match self.store.read(Folder::Queue, id).await {
            Ok(entry) => entry,
            // Already terminal and archived (or deleted)
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(SystemError::StoreRead(e.to_string()).into()),
        };

        match entry.state {
            EntryState::Queued => {}
            EntryState::Sending => {
                // Claimed in the meantime. If the claim was ours, latch the
                // token; a claim on another node cannot be reached from here.
                if let Some(token) = self.inflight.get(id) {
                    token.cancel();
                } else {
                    warn!(
                        entry_id = %id,
                        owner = %entry.owner,
                        "Cannot cancel: entry is sending on another node"
                    );
                }
                return Ok(());
            }
            _ => return Ok(()),
        }

        self.archive_entry(id, EntryState::Cancelled).await?;
        self.resolve_outcome(id, DispatchOutcome::Cancelled);

        info!(entry_id = %id, logging_id = %entry.logging_id, "Cancelled queued entry");

        Ok(())
    }

    /// Run the engine until a shutdown signal arrives.
    ///
    /// Periodically invokes [`retry_scan`](Self::retry_scan); an external
    /// trigger may call it directly instead of using this loop.
    ///
    /// On shutdown the engine is disabled, then in-flight deliveries are
    /// given a bounded grace period to finish; whatever remains is retried
    /// after a restart.
    ///
    /// # Errors
    /// Currently always returns `Ok`; the signature leaves room for fatal
    /// startup errors.
    pub async fn serve(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        internal!(level = INFO, "Dispatch engine starting");

        let mut scan_timer =
            tokio::time::interval(Duration::from_secs(self.config.scan_interval_secs.max(1)));

        // Skip the first tick to avoid immediate execution
        scan_timer.tick().await;

        loop {
            tokio::select! {
                _ = scan_timer.tick() => {
                    match self.retry_scan().await {
                        Ok(count) if count > 0 => {
                            info!("Retry scan started {count} delivery tasks");
                        }
                        Ok(_) => {
                            debug!("Retry scan found no due entries");
                        }
                        Err(e) => {
                            error!("Error scanning dispatch queue: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "Dispatch engine received shutdown signal");
                            self.shutdown();

                            let grace = Duration::from_secs(self.config.shutdown_grace_secs);
                            let start = std::time::Instant::now();

                            while !self.inflight.is_empty() {
                                if start.elapsed() >= grace {
                                    warn!(
                                        "Shutdown grace period exceeded, {} in-flight deliveries will be retried after restart",
                                        self.inflight.len()
                                    );
                                    break;
                                }

                                debug!(
                                    "Waiting for {} in-flight deliveries to complete ({:.1}s elapsed)...",
                                    self.inflight.len(),
                                    start.elapsed().as_secs_f64()
                                );
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }

                            if self.inflight.is_empty() {
                                internal!(level = INFO, "All in-flight deliveries completed");
                            }

                            internal!(level = INFO, "Dispatch engine shutdown complete");
                            break;
                        }
                        Err(e) => {
                            error!("Dispatch engine shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Start a delivery task for `id` unless one is already running here.
    pub(crate) fn start_task(self: &Arc<Self>, id: EntryId) {
        let cancel = CancelToken::new();

        match self.inflight.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }

        let task = DeliveryTask::new(Arc::clone(self), id, cancel);
        tokio::spawn(task.run());
    }

    /// Resolve connection parameters for a server configuration, fresh.
    ///
    /// Any failure to resolve is non-retryable: configuration is assumed to
    /// be an operator mistake, not transient.
    pub(crate) async fn resolve_params(
        &self,
        server_config: &ConfigRef,
    ) -> Result<ConnectionParams, DispatchError> {
        match self.resolver.resolve(server_config).await {
            Ok(Some(params)) => Ok(params),
            Ok(None) => Err(PermanentError::ConfigUnresolved(server_config.to_string()).into()),
            Err(e) => Err(PermanentError::ConfigUnresolved(e.to_string()).into()),
        }
    }

    /// Perform one transport send bounded by the configured timeout.
    pub(crate) async fn timed_send(
        &self,
        message: &OutboundMessage,
        params: &ConnectionParams,
    ) -> Result<TransportId, DispatchError> {
        let timeout = Duration::from_secs(self.config.send_timeout_secs);

        match tokio::time::timeout(timeout, self.transport.send(message, params)).await {
            Ok(result) => result,
            Err(_) => Err(TemporaryError::Timeout(format!(
                "transport send exceeded {}s",
                self.config.send_timeout_secs
            ))
            .into()),
        }
    }

    /// Archive the entry at `id` into its terminal state.
    ///
    /// Re-reads under a fresh store session and skips silently if the entry
    /// is gone: a concurrent cancel and a concurrent completion can both
    /// attempt this step. Keep-vs-delete follows the cleanup policy, except
    /// internal errors, which are always kept.
    ///
    /// # Errors
    /// Returns an error on persistence failures or a non-terminal state.
    pub(crate) async fn archive_entry(
        &self,
        id: &EntryId,
        final_state: EntryState,
    ) -> Result<(), DispatchError> {
        let mut entry = match self.store.read(Folder::Queue, id).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                debug!(entry_id = %id, "Entry already archived");
                return Ok(());
            }
            Err(e) => return Err(SystemError::StoreRead(e.to_string()).into()),
        };

        let keep = match &final_state {
            EntryState::Sent => {
                // The secret will not be needed again
                entry.clear_credential();
                self.config.cleanup.keep_delivered_entries()
            }
            EntryState::Failed { .. } | EntryState::Cancelled => {
                self.config.cleanup.keep_failed_entries()
            }
            // A defect signal: kept for investigation, never auto-deleted
            EntryState::InternalError { .. } => true,
            EntryState::Queued | EntryState::Sending => {
                return Err(SystemError::Inconsistent(format!(
                    "refusing to archive non-terminal state {final_state}"
                ))
                .into());
            }
        };

        entry.next_try = None;
        entry.state = final_state;

        self.store
            .update(Folder::Queue, id, &entry)
            .await
            .map_err(|e| SystemError::StoreWrite(e.to_string()))?;

        if keep {
            self.store
                .relocate(Folder::Queue, folder_for(&entry.state), id)
                .await
                .map_err(|e| SystemError::StoreWrite(e.to_string()))?;
            debug!(
                entry_id = %id,
                logging_id = %entry.logging_id,
                state = %entry.state,
                "Archived terminal entry"
            );
        } else {
            self.store
                .delete(Folder::Queue, id)
                .await
                .map_err(|e| SystemError::StoreWrite(e.to_string()))?;
            debug!(
                entry_id = %id,
                logging_id = %entry.logging_id,
                state = %entry.state,
                "Deleted terminal entry per cleanup policy"
            );
        }

        Ok(())
    }

    /// Complete the caller's handle for `id`, if one is waiting.
    pub(crate) fn resolve_outcome(&self, id: &EntryId, outcome: DispatchOutcome) {
        if let Some((_, tx)) = self.pending.remove(id) {
            // The receiver may have been dropped; that's the caller's choice
            let _ = tx.send(outcome);
        }
    }

    /// Drop a finished task from the in-flight tracking set.
    pub(crate) fn finish_task(&self, id: &EntryId) {
        self.inflight.remove(id);
    }

    pub(crate) fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub(crate) const fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }
}

/// Outcome-specific archive location for a terminal state.
const fn folder_for(state: &EntryState) -> Folder {
    match state {
        EntryState::Sent => Folder::Sent,
        EntryState::Failed { .. } => Folder::Failed,
        EntryState::Cancelled => Folder::Cancelled,
        EntryState::InternalError { .. } => Folder::Error,
        EntryState::Queued | EntryState::Sending => Folder::Queue,
    }
}
