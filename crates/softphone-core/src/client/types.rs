//! Snapshot types returned by the client

use serde::{Deserialize, Serialize};

use crate::audio::AudioRoute;
use crate::call::{CallSession, CallState, SessionId};
use crate::keepalive::KeepAliveStatus;
use crate::registration::{LastError, RegistrationState};

/// Point-in-time view of the whole core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreStatus {
    pub registration: RegistrationState,
    pub last_error: Option<LastError>,
    /// The live call, if any
    pub session: Option<CallSession>,
    pub active_session_id: SessionId,
    pub unregister_when_call_ends: bool,
    pub keep_alive: KeepAliveStatus,
    pub audio: AudioRoute,
}

impl CoreStatus {
    pub fn call_state(&self) -> CallState {
        self.session.as_ref().map(|s| s.state).unwrap_or(CallState::Idle)
    }

    pub fn is_registered(&self) -> bool {
        self.registration == RegistrationState::Registered
    }
}
