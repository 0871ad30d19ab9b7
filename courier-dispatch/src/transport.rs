//! Consumed boundaries: the transport capability and server-configuration
//! resolution.
//!
//! The dispatch core never talks to the network itself; it hands a
//! transport-ready message plus freshly resolved connection parameters to a
//! [`Transport`] implementation and classifies whatever comes back.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::ConfigRef;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Identifier returned by the transport for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportId(String);

impl TransportId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully assembled, transport-ready message handed to the engine.
///
/// Content assembly (subject/body/attachments/substitution) happens
/// elsewhere; the engine only sees the finished payload.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Opaque correlation id for logs. Never contains message content.
    pub logging_id: String,

    /// The serialized payload.
    pub body: Arc<[u8]>,

    /// Optional opaque secret reference for authenticating to the transport.
    pub credential_token: Option<String>,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(logging_id: impl Into<String>, body: Arc<[u8]>) -> Self {
        Self {
            logging_id: logging_id.into(),
            body,
            credential_token: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, token: impl Into<String>) -> Self {
        self.credential_token = Some(token.into());
        self
    }
}

/// Transport operation timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportTimeouts {
    /// Timeout for connection establishment.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for handing over the message payload.
    ///
    /// This is longer than the connect timeout to accommodate large
    /// messages. Default: 120 seconds
    #[serde(default = "default_submit_timeout")]
    pub submit_secs: u64,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            submit_secs: default_submit_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_submit_timeout() -> u64 {
    120
}

/// Connection parameters produced by resolving a server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,

    pub port: u16,

    /// Require a TLS-protected session before submitting the payload.
    #[serde(default)]
    pub require_tls: bool,

    #[serde(default)]
    pub timeouts: TransportTimeouts,
}

impl ConnectionParams {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            require_tls: false,
            timeouts: TransportTimeouts::default(),
        }
    }

    /// The `host:port` address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The transport capability the engine delivers through.
///
/// Implementations classify their failures via [`DispatchError`]: temporary
/// errors are eligible for reschedule, permanent errors terminate the entry.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Attempt delivery of `message` using `params`.
    ///
    /// # Errors
    /// Returns a classified [`DispatchError`] on failure.
    async fn send(
        &self,
        message: &OutboundMessage,
        params: &ConnectionParams,
    ) -> Result<TransportId, DispatchError>;
}

/// Resolves a server-configuration reference into connection parameters.
///
/// Resolution happens at send time, never at enqueue time, so configuration
/// changes are picked up on retry. `Ok(None)` means the configuration does
/// not exist; the task treats that as a non-retryable failure.
#[async_trait]
pub trait ConfigResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `config` into connection parameters, or `None` if absent.
    ///
    /// # Errors
    /// Returns an error if resolution itself fails; the task treats any
    /// resolver error as non-retryable.
    async fn resolve(&self, config: &ConfigRef) -> Result<Option<ConnectionParams>, DispatchError>;
}
