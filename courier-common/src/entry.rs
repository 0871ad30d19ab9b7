//! The durable queue entry record and its state machine.
//!
//! A [`QueueEntry`] is the persisted representation of one in-flight or
//! archived outbound message. Its serialized shape is the only format
//! contract the dispatch core has: it must round-trip exactly across a
//! process restart.

use std::{sync::Arc, time::SystemTime};

use serde::{Deserialize, Serialize};

/// Identity of one worker process sharing the durable store.
///
/// Claim checks compare this against the entry's `owner` field; mutation of
/// an entry is only performed by the node that currently believes it owns
/// the claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Generate a fresh node identity (process-unique, sortable by start time).
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(format!(
            "{}-{}",
            std::process::id(),
            ulid::Ulid::new()
        )))
    }

    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the routing/server configuration to use for a send.
///
/// Resolved lazily at send time, never at enqueue time, so configuration
/// changes are picked up on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRef {
    /// Store path or identifier of the server configuration.
    pub path: String,
    /// Optional tenant scope the configuration is resolved under.
    #[serde(default)]
    pub tenant: Option<String>,
}

impl ConfigRef {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tenant: None,
        }
    }

    #[must_use]
    pub fn with_tenant(path: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tenant: Some(tenant.into()),
        }
    }
}

impl std::fmt::Display for ConfigRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tenant {
            Some(tenant) => write!(f, "{}@{tenant}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Waiting for its `next_try` time to come due.
    Queued,
    /// Claimed by a worker; a send attempt is in flight.
    Sending,
    /// Delivered; terminal.
    Sent,
    /// Delivery gave up; terminal.
    Failed { reason: String },
    /// Cancelled by the caller; terminal.
    Cancelled,
    /// The entry was observed in an impossible state; terminal, kept for
    /// investigation and never cleaned up automatically.
    InternalError { detail: String },
}

impl EntryState {
    /// Terminal states are archived or deleted and never re-claimed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Failed { .. } | Self::Cancelled | Self::InternalError { .. }
        )
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed { .. } => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InternalError { .. } => write!(f, "internal-error"),
        }
    }
}

/// The durable record for one outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Opaque correlation id for logs. Never contains message content.
    pub logging_id: String,

    /// The fully assembled, transport-ready payload.
    pub message: Arc<[u8]>,

    /// Routing/server configuration reference, resolved fresh on every
    /// attempt.
    pub server_config: ConfigRef,

    /// Opaque secret reference used to authenticate to the transport.
    /// Cleared once the entry is archived as sent.
    #[serde(default)]
    pub credential_token: Option<String>,

    pub state: EntryState,

    /// Number of transient-failure reschedules so far.
    pub retry_count: u32,

    /// When this entry becomes eligible for retry-scan pickup.
    /// `None` means never: set the instant an entry is claimed so no second
    /// worker picks it up concurrently.
    pub next_try: Option<SystemTime>,

    /// The node that currently owns (or last claimed) this entry.
    pub owner: NodeId,

    /// When the entry was first enqueued.
    pub queued_at: SystemTime,

    /// Store-assigned identifier, filled in on create.
    #[serde(default)]
    pub tracking_id: Option<String>,
}

impl QueueEntry {
    /// Create a fresh entry in the `Queued` state owned by `owner`.
    #[must_use]
    pub fn new(
        logging_id: impl Into<String>,
        message: Arc<[u8]>,
        server_config: ConfigRef,
        credential_token: Option<String>,
        owner: NodeId,
    ) -> Self {
        Self {
            logging_id: logging_id.into(),
            message,
            server_config,
            credential_token,
            state: EntryState::Queued,
            retry_count: 0,
            next_try: None,
            owner,
            queued_at: SystemTime::now(),
            tracking_id: None,
        }
    }

    /// Whether a retry scan may pick this entry up at `now`.
    #[must_use]
    pub fn is_due(&self, now: SystemTime) -> bool {
        matches!(self.state, EntryState::Queued) && self.next_try.is_some_and(|at| at <= now)
    }

    /// Drop the credential token. Called when archiving a delivered entry,
    /// since the secret will not be needed again.
    pub fn clear_credential(&mut self) {
        self.credential_token = None;
    }
}
