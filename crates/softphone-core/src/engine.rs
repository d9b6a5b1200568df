//! SIP engine collaborator
//!
//! The core does not speak SIP. A host-supplied [`SipEngine`] performs the
//! wire transactions; the core calls it from worker tasks (engine calls may
//! block on network I/O) and turns each returned result into a state
//! transition on its serialized context.
//!
//! Events the engine raises on its own (incoming calls, remote hang-ups,
//! registration expiry) are pushed through the [`EngineEventSink`] handed to
//! [`SipEngine::attach`] at login.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::account::Account;
use crate::call::SessionId;
use crate::client::actor::CoreMessage;
use crate::error::{ClientError, ClientResult};

/// Signaling engine contract consumed by the core
///
/// Each request resolves when the engine has the final answer. Failures are
/// reported as [`ClientError::NetworkError`] (no response, transport down) or
/// [`ClientError::ProtocolError`] (server rejected the request with a code).
#[async_trait]
pub trait SipEngine: Send + Sync {
    /// Called once at login with the sink for engine-initiated events
    fn attach(&self, _events: EngineEventSink) {}

    async fn send_register(&self, account: &Account) -> ClientResult<()>;

    async fn send_unregister(&self, account: &Account) -> ClientResult<()>;

    /// Start an outbound call using the handle the core allocated
    async fn send_invite(&self, session_id: SessionId, target: &str) -> ClientResult<()>;

    async fn send_answer(&self, session_id: SessionId) -> ClientResult<()>;

    /// End a call, or decline one that was never answered
    async fn send_hangup(&self, session_id: SessionId) -> ClientResult<()>;

    async fn send_keep_alive(&self) -> ClientResult<()>;
}

/// Asynchronous notifications raised by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new inbound call is alerting
    IncomingCall { session_id: SessionId, caller: String },
    /// The far end of an outbound call is ringing
    RemoteRinging { session_id: SessionId },
    /// The far end answered an outbound call
    CallConnected { session_id: SessionId },
    /// The call ended without a local hang-up (remote BYE, CANCEL, media loss)
    CallTerminated { session_id: SessionId, reason: Option<String> },
    /// The server dropped or expired the registration
    RegistrationLost { code: i32, message: String },
}

/// Handle through which the engine posts [`EngineEvent`]s to the core
///
/// The sink does not keep the core alive; after logout every push fails with
/// [`ClientError::CoreShutdown`].
#[derive(Clone)]
pub struct EngineEventSink {
    tx: mpsc::WeakSender<CoreMessage>,
}

impl EngineEventSink {
    pub(crate) fn new(tx: mpsc::WeakSender<CoreMessage>) -> Self {
        Self { tx }
    }

    pub async fn push(&self, event: EngineEvent) -> ClientResult<()> {
        let tx = self.tx.upgrade().ok_or(ClientError::CoreShutdown)?;
        tx.send(CoreMessage::Engine(event)).await.map_err(|_| ClientError::CoreShutdown)
    }
}

impl std::fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEventSink").finish_non_exhaustive()
    }
}
