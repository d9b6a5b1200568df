//! Call session types and the single-session state machine
//!
//! The softphone handles at most one live call at a time. A session moves
//! through the following states:
//!
//! ```text
//!            inbound                       outbound
//!   Idle ──► Ringing ──┐         Idle ──► Answering ──┐
//!                      ▼                              ▼
//!                    Active ──► Ending ──► Ended ──► Idle
//! ```
//!
//! [`CallSessionController`] is a plain state machine. It never talks to the
//! engine or the audio device itself; callers apply its decisions and report
//! engine results back into it. Every method that changes state returns a
//! [`CallTransition`] describing what happened so the caller can surface it.
//!
//! # Example
//!
//! ```rust
//! use softphone_core::call::{AnswerOutcome, CallSessionController, CallState, SessionId};
//!
//! let mut calls = CallSessionController::new();
//! calls.incoming(SessionId::new(42), "sip:bob@example.com").unwrap();
//! assert_eq!(calls.state(), CallState::Ringing);
//!
//! // The sentinel answers whatever call is currently pending
//! let (outcome, _) = calls.answer(SessionId::INVALID).unwrap();
//! assert_eq!(outcome, AnswerOutcome::Answered);
//! assert_eq!(calls.active_session_id(), SessionId::new(42));
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Opaque call handle shared with the engine
///
/// [`SessionId::INVALID`] means "no session". When passed to
/// `answer_call` it stands for "the call that is currently pending".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    /// Sentinel meaning "no session"
    pub const INVALID: SessionId = SessionId(-1);

    pub const fn new(raw: i64) -> Self {
        SessionId(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Direction of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => write!(f, "inbound"),
            CallDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Lifecycle state of the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallState {
    /// No session exists
    Idle,
    /// Inbound call waiting to be answered
    Ringing,
    /// Outbound call waiting for the remote party
    Answering,
    /// Media flowing
    Active,
    /// Hang-up requested, waiting for the engine to confirm
    Ending,
    /// Session finished; the controller returns to `Idle` right after
    Ended,
}

impl CallState {
    /// `Idle` and `Ended` both mean there is no live session
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Idle | CallState::Ended)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "Idle",
            CallState::Ringing => "Ringing",
            CallState::Answering => "Answering",
            CallState::Active => "Active",
            CallState::Ending => "Ending",
            CallState::Ended => "Ended",
        };
        f.write_str(name)
    }
}

/// Error attached to a call that was ended by a network or protocol failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallError {
    pub code: i32,
    pub message: String,
}

impl From<&ClientError> for CallError {
    fn from(err: &ClientError) -> Self {
        CallError { code: err.status_code(), message: err.to_string() }
    }
}

/// The single call session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub session_id: SessionId,
    pub direction: CallDirection,
    pub state: CallState,
    /// Caller URI for inbound calls, dialed target for outbound ones
    pub remote: String,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A state change of the call session, ready to be surfaced
#[derive(Debug, Clone, PartialEq)]
pub struct CallTransition {
    pub session_id: SessionId,
    pub direction: CallDirection,
    pub previous: CallState,
    pub state: CallState,
    pub remote: String,
    pub reason: Option<String>,
    pub error: Option<CallError>,
}

impl CallTransition {
    fn from_session(session: &CallSession, previous: CallState) -> Self {
        CallTransition {
            session_id: session.session_id,
            direction: session.direction,
            previous,
            state: session.state,
            remote: session.remote.clone(),
            reason: None,
            error: None,
        }
    }
}

/// Result of an answer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerOutcome {
    /// The pending call is now active
    Answered,
    /// The call was already active; nothing changed
    AlreadyActive,
    /// No pending call matches the handle
    InvalidSession,
}

/// Result of a hang-up request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HangupOutcome {
    /// The session is ending; the engine confirmation completes it
    Ending(SessionId),
    /// There was no session to end
    NoSession,
}

/// Tag for engine requests issued on behalf of one session
///
/// Outbound handles are allocated locally and inbound ones by the engine, so
/// the same [`SessionId`] can name two different calls over time. The epoch
/// tells them apart: it changes with every new session, and a request result
/// only applies to the session that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle {
    pub session_id: SessionId,
    epoch: u64,
}

impl CallHandle {
    /// Handle that never matches a session, for requests about calls the
    /// controller never tracked (a declined second call)
    pub fn detached(session_id: SessionId) -> Self {
        CallHandle { session_id, epoch: 0 }
    }
}

/// State machine owning the one live call session
#[derive(Debug)]
pub struct CallSessionController {
    session: Option<CallSession>,
    // Epoch of the live session; bumped for every new one
    epoch: u64,
    next_outbound_id: i64,
}

impl CallSessionController {
    pub fn new() -> Self {
        Self { session: None, epoch: 0, next_outbound_id: 1 }
    }

    /// Tag for requests issued on behalf of the live session
    pub fn handle(&self) -> Option<CallHandle> {
        self.session.as_ref().map(|s| CallHandle { session_id: s.session_id, epoch: self.epoch })
    }

    /// Whether a request tag still belongs to the live session
    pub fn is_current_handle(&self, handle: CallHandle) -> bool {
        handle.epoch != 0 && handle.epoch == self.epoch && self.is_current(handle.session_id)
    }

    /// Handle of the live session, or [`SessionId::INVALID`]
    pub fn active_session_id(&self) -> SessionId {
        self.session.as_ref().map(|s| s.session_id).unwrap_or(SessionId::INVALID)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> CallState {
        self.session.as_ref().map(|s| s.state).unwrap_or(CallState::Idle)
    }

    pub fn has_live_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether `session_id` names the live session
    pub fn is_current(&self, session_id: SessionId) -> bool {
        session_id.is_valid() && self.active_session_id() == session_id
    }

    /// Register an inbound call announced by the engine
    ///
    /// Fails with [`ClientError::CallInProgress`] when a session is already
    /// live; the caller is expected to decline the new call.
    pub fn incoming(
        &mut self,
        session_id: SessionId,
        caller: impl Into<String>,
    ) -> ClientResult<CallTransition> {
        if let Some(live) = &self.session {
            return Err(ClientError::CallInProgress { session_id: live.session_id });
        }
        if !session_id.is_valid() {
            return Err(ClientError::InvalidSession { session_id });
        }

        let session = CallSession {
            session_id,
            direction: CallDirection::Inbound,
            state: CallState::Ringing,
            remote: caller.into(),
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
        };
        let transition = CallTransition::from_session(&session, CallState::Idle);
        self.epoch += 1;
        self.session = Some(session);
        Ok(transition)
    }

    /// Create an outbound session in `Answering` with a locally allocated handle
    pub fn begin_outbound(&mut self, target: impl Into<String>) -> ClientResult<CallTransition> {
        if let Some(live) = &self.session {
            return Err(ClientError::CallInProgress { session_id: live.session_id });
        }

        let session_id = SessionId::new(self.next_outbound_id);
        self.next_outbound_id += 1;

        let session = CallSession {
            session_id,
            direction: CallDirection::Outbound,
            state: CallState::Answering,
            remote: target.into(),
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
        };
        let transition = CallTransition::from_session(&session, CallState::Idle);
        self.epoch += 1;
        self.session = Some(session);
        Ok(transition)
    }

    /// Answer the pending inbound call
    ///
    /// `SessionId::INVALID` selects the current pending call. Any other handle
    /// must match the live session exactly. The transition to `Active` is
    /// applied immediately; if the engine later rejects the answer the caller
    /// reports it through [`CallSessionController::fail`].
    pub fn answer(
        &mut self,
        requested: SessionId,
    ) -> ClientResult<(AnswerOutcome, Option<CallTransition>)> {
        let Some(session) = self.session.as_mut() else {
            return Ok((AnswerOutcome::InvalidSession, None));
        };
        if requested.is_valid() && requested != session.session_id {
            return Ok((AnswerOutcome::InvalidSession, None));
        }

        match session.state {
            CallState::Active => Ok((AnswerOutcome::AlreadyActive, None)),
            CallState::Ringing => {
                let previous = session.state;
                session.state = CallState::Active;
                session.connected_at = Some(Utc::now());
                Ok((AnswerOutcome::Answered, Some(CallTransition::from_session(session, previous))))
            }
            other => Err(ClientError::invalid_state("answer call", other.to_string())),
        }
    }

    /// Outbound call accepted by the remote party
    pub fn connected(&mut self, session_id: SessionId) -> Option<CallTransition> {
        let session = self.session.as_mut().filter(|s| s.session_id == session_id)?;
        if session.state != CallState::Answering {
            return None;
        }
        let previous = session.state;
        session.state = CallState::Active;
        session.connected_at = Some(Utc::now());
        Some(CallTransition::from_session(session, previous))
    }

    /// Start ending the live session
    ///
    /// Idempotent: a session already `Ending` reports the same outcome without
    /// a new transition, and no session yields [`HangupOutcome::NoSession`].
    pub fn begin_hangup(&mut self) -> (HangupOutcome, Option<CallTransition>) {
        let Some(session) = self.session.as_mut() else {
            return (HangupOutcome::NoSession, None);
        };
        let outcome = HangupOutcome::Ending(session.session_id);
        if session.state == CallState::Ending {
            return (outcome, None);
        }
        let previous = session.state;
        session.state = CallState::Ending;
        (outcome, Some(CallTransition::from_session(session, previous)))
    }

    /// Finish the session; the controller returns to `Idle`
    ///
    /// For terminations reported by the engine, which owns the id space of
    /// its own events. Returns `None` when `session_id` is stale.
    pub fn finish(&mut self, session_id: SessionId, reason: Option<String>) -> Option<CallTransition> {
        self.end_with(session_id, reason, None)
    }

    /// Finish the session once a request it issued (the hang-up) succeeded
    ///
    /// Returns `None` when the handle belongs to an earlier session, even if
    /// that session had the same id.
    pub fn finish_request(&mut self, handle: CallHandle, reason: Option<String>) -> Option<CallTransition> {
        if !self.is_current_handle(handle) {
            return None;
        }
        self.end_with(handle.session_id, reason, None)
    }

    /// End the session because one of its requests failed with a network or
    /// protocol error. Produces the `Ending` step (unless already there)
    /// followed by `Ended` carrying the error.
    pub fn fail(&mut self, handle: CallHandle, error: &ClientError) -> Vec<CallTransition> {
        if !self.is_current_handle(handle) {
            return Vec::new();
        }
        let session_id = handle.session_id;

        let mut transitions = Vec::with_capacity(2);
        if self.state() != CallState::Ending {
            let (_, ending) = self.begin_hangup();
            transitions.extend(ending);
        }
        transitions.extend(self.end_with(session_id, None, Some(CallError::from(error))));
        transitions
    }

    fn end_with(
        &mut self,
        session_id: SessionId,
        reason: Option<String>,
        error: Option<CallError>,
    ) -> Option<CallTransition> {
        if !self.is_current(session_id) {
            return None;
        }
        let mut session = self.session.take()?;
        let previous = session.state;
        session.state = CallState::Ended;
        session.ended_at = Some(Utc::now());

        let mut transition = CallTransition::from_session(&session, previous);
        transition.reason = reason;
        transition.error = error;
        Some(transition)
    }
}

impl Default for CallSessionController {
    fn default() -> Self {
        Self::new()
    }
}
