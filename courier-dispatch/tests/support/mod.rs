//! Test doubles for the dispatch engine: scripted and gated transports plus
//! a static configuration resolver.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::ConfigRef;
use courier_dispatch::{
    ConfigResolver, ConnectionParams, DispatchError, OutboundMessage, Transport, TransportId,
};
use tokio::sync::Notify;

/// Transport that plays back a queue of scripted results.
///
/// Once the script is exhausted every send succeeds with a generated
/// transport id.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportId, DispatchError>>>,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: Result<TransportId, DispatchError>) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _message: &OutboundMessage,
        _params: &ConnectionParams,
    ) -> Result<TransportId, DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportId::new(format!("wire-{attempt}"))))
    }
}

/// Transport whose sends block on a gate until the test releases them.
///
/// `started` is signalled when a send enters the transport; the send then
/// waits on `gate` and succeeds once released. Both signals store a permit,
/// so signalling before the other side waits is safe.
#[derive(Debug, Default)]
pub struct GatedTransport {
    pub started: Arc<Notify>,
    pub gate: Arc<Notify>,
    fail_next: Mutex<Option<DispatchError>>,
    attempts: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Make the next released send fail with `error`.
    pub fn fail_next(&self, error: DispatchError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(
        &self,
        _message: &OutboundMessage,
        _params: &ConnectionParams,
    ) -> Result<TransportId, DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.notify_one();
        self.gate.notified().await;

        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        Ok(TransportId::new(format!("gated-{attempt}")))
    }
}

/// Resolver that returns the same connection parameters for every reference.
#[derive(Debug)]
pub struct StaticResolver {
    params: Option<ConnectionParams>,
}

impl StaticResolver {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params: Some(params),
        }
    }

    /// A resolver for which every configuration reference is absent.
    pub fn unresolvable() -> Self {
        Self { params: None }
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new(ConnectionParams::new("mail.test.invalid", 2525))
    }
}

#[async_trait]
impl ConfigResolver for StaticResolver {
    async fn resolve(
        &self,
        _config: &ConfigRef,
    ) -> Result<Option<ConnectionParams>, DispatchError> {
        Ok(self.params.clone())
    }
}

pub fn message(logging_id: &str) -> OutboundMessage {
    OutboundMessage::new(logging_id, Arc::from(b"payload".as_slice()))
}

pub fn config_ref() -> ConfigRef {
    ConfigRef::new("/server/default")
}
