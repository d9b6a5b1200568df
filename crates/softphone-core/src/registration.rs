//! Account registration state machine
//!
//! # States
//!
//! ```text
//!   Unregistered ──register()──► Registering ──ok──► Registered
//!        ▲   ▲                        │                  │
//!        │   └──────register()──── Failed ◄──error/timeout┘
//!        └────────────unregister() (direct or deferred)──┘
//! ```
//!
//! `Failed` and `Unregistered` are both re-enterable through `register()`.
//! The core never retries on its own: leaving `Failed` is always an explicit
//! caller decision.
//!
//! # Generations
//!
//! Every register/refresh request is tagged with the controller's current
//! generation. `unregister()` and registration loss bump the generation, so a
//! result that arrives after the caller moved on is recognised as stale and
//! dropped instead of resurrecting an abandoned state.
//!
//! # Deferred unregister
//!
//! Unregistering while a call is live only sets the `unregister_when_call_ends`
//! flag. The transition happens when the call session reports that the call
//! ended ([`RegistrationController::on_call_ended`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Registration state, with the numeric codes pushed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationState {
    Unregistered = 0,
    Registering = 1,
    Registered = 2,
    Failed = 3,
}

impl RegistrationState {
    /// Code reported through the registration callback
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(RegistrationState::Unregistered),
            1 => Some(RegistrationState::Registering),
            2 => Some(RegistrationState::Registered),
            3 => Some(RegistrationState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "Unregistered"),
            RegistrationState::Registering => write!(f, "Registering"),
            RegistrationState::Registered => write!(f, "Registered"),
            RegistrationState::Failed => write!(f, "Failed"),
        }
    }
}

/// Last registration failure kept on the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub code: i32,
    pub message: String,
}

impl From<&ClientError> for LastError {
    fn from(err: &ClientError) -> Self {
        LastError { code: err.status_code(), message: err.to_string() }
    }
}

/// Which request a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Register,
    Refresh,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Register => write!(f, "register"),
            RequestKind::Refresh => write!(f, "refresh_register"),
        }
    }
}

/// A registration state change, ready to be surfaced
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationTransition {
    pub previous: RegistrationState,
    pub state: RegistrationState,
    pub error: Option<LastError>,
}

impl RegistrationTransition {
    /// Message for the registration callback; empty unless `Failed`
    pub fn error_message(&self) -> String {
        self.error.as_ref().map(|e| e.message.clone()).unwrap_or_default()
    }
}

/// What happened to a register/refresh result
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Superseded by a later unregister/loss/register; nothing changed
    Stale,
    /// Accepted, state did not change (successful refresh)
    Unchanged,
    Transition(RegistrationTransition),
}

/// Decision taken for an unregister request
#[derive(Debug, Clone, PartialEq)]
pub enum UnregisterDecision {
    /// State moved to `Unregistered`. `notify_engine` is set when the server
    /// may hold a binding that should be removed.
    Immediate { transition: RegistrationTransition, notify_engine: bool },
    /// A call is live; the transition waits for it to end
    Deferred,
    AlreadyUnregistered,
}

/// Public summary of an unregister request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnregisterOutcome {
    Unregistered,
    Deferred,
    AlreadyUnregistered,
}

impl From<&UnregisterDecision> for UnregisterOutcome {
    fn from(decision: &UnregisterDecision) -> Self {
        match decision {
            UnregisterDecision::Immediate { .. } => UnregisterOutcome::Unregistered,
            UnregisterDecision::Deferred => UnregisterOutcome::Deferred,
            UnregisterDecision::AlreadyUnregistered => UnregisterOutcome::AlreadyUnregistered,
        }
    }
}

#[derive(Debug)]
pub struct RegistrationController {
    state: RegistrationState,
    generation: u64,
    refresh_in_flight: bool,
    unregister_when_call_ends: bool,
    last_error: Option<LastError>,
}

impl RegistrationController {
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
            generation: 0,
            refresh_in_flight: false,
            unregister_when_call_ends: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    pub fn unregister_when_call_ends(&self) -> bool {
        self.unregister_when_call_ends
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.refresh_in_flight
    }

    /// Keep-alive must run exactly while registered
    pub fn keep_alive_enabled(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Start a registration attempt
    ///
    /// Returns the transition to `Registering`, or `None` when already
    /// registering or registered.
    pub fn begin_register(&mut self) -> Option<RegistrationTransition> {
        match self.state {
            RegistrationState::Unregistered | RegistrationState::Failed => {
                self.generation += 1;
                self.refresh_in_flight = false;
                // A fresh attempt supersedes an unregister queued behind the call
                self.unregister_when_call_ends = false;
                Some(self.transition_to(RegistrationState::Registering, None))
            }
            RegistrationState::Registering | RegistrationState::Registered => None,
        }
    }

    /// Mark a refresh as dispatched and return its generation tag
    ///
    /// `None` when not registered or when a refresh is already in flight.
    pub fn begin_refresh(&mut self) -> Option<u64> {
        if self.state != RegistrationState::Registered || self.refresh_in_flight {
            return None;
        }
        self.refresh_in_flight = true;
        Some(self.generation)
    }

    /// Apply the result of a register or refresh request
    pub fn complete(
        &mut self,
        generation: u64,
        kind: RequestKind,
        result: Result<(), ClientError>,
    ) -> Completion {
        if generation != self.generation {
            return Completion::Stale;
        }

        match kind {
            RequestKind::Register => {
                if self.state != RegistrationState::Registering {
                    return Completion::Stale;
                }
                match result {
                    Ok(()) => Completion::Transition(
                        self.transition_to(RegistrationState::Registered, None),
                    ),
                    Err(err) => Completion::Transition(
                        self.transition_to(RegistrationState::Failed, Some(LastError::from(&err))),
                    ),
                }
            }
            RequestKind::Refresh => {
                if !self.refresh_in_flight || self.state != RegistrationState::Registered {
                    return Completion::Stale;
                }
                self.refresh_in_flight = false;
                match result {
                    Ok(()) => Completion::Unchanged,
                    Err(err) => {
                        self.generation += 1;
                        Completion::Transition(
                            self.transition_to(RegistrationState::Failed, Some(LastError::from(&err))),
                        )
                    }
                }
            }
        }
    }

    /// Handle an unregister request
    ///
    /// With a live call and an established (or failed) registration the
    /// request is deferred: the flag is set and the state is left alone. An
    /// attempt still in flight is always abandoned at once, call or not, so
    /// its late result cannot register the account. Otherwise the controller
    /// moves to `Unregistered` immediately and invalidates any in-flight
    /// request.
    pub fn request_unregister(&mut self, call_live: bool) -> UnregisterDecision {
        if self.state == RegistrationState::Unregistered {
            return UnregisterDecision::AlreadyUnregistered;
        }
        if call_live && self.state != RegistrationState::Registering {
            self.unregister_when_call_ends = true;
            return UnregisterDecision::Deferred;
        }
        self.unregister_now()
    }

    /// Call ended; run a deferred unregister if one is pending
    pub fn on_call_ended(&mut self) -> Option<UnregisterDecision> {
        if !self.unregister_when_call_ends {
            return None;
        }
        Some(self.unregister_now())
    }

    /// The server dropped or expired the binding
    pub fn registration_lost(&mut self, error: LastError) -> Option<RegistrationTransition> {
        match self.state {
            RegistrationState::Registered | RegistrationState::Registering => {
                self.generation += 1;
                self.refresh_in_flight = false;
                Some(self.transition_to(RegistrationState::Failed, Some(error)))
            }
            RegistrationState::Unregistered | RegistrationState::Failed => None,
        }
    }

    fn unregister_now(&mut self) -> UnregisterDecision {
        let notify_engine = matches!(
            self.state,
            RegistrationState::Registered | RegistrationState::Registering
        );
        self.generation += 1;
        self.refresh_in_flight = false;
        self.unregister_when_call_ends = false;
        UnregisterDecision::Immediate {
            transition: self.transition_to(RegistrationState::Unregistered, None),
            notify_engine,
        }
    }

    fn transition_to(
        &mut self,
        state: RegistrationState,
        error: Option<LastError>,
    ) -> RegistrationTransition {
        let previous = self.state;
        self.state = state;
        // Failed keeps its cause; any other state clears it
        self.last_error = error.clone();
        RegistrationTransition { previous, state, error }
    }
}

impl Default for RegistrationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> RegistrationController {
        let mut reg = RegistrationController::new();
        reg.begin_register().unwrap();
        let generation = reg.generation();
        assert!(matches!(
            reg.complete(generation, RequestKind::Register, Ok(())),
            Completion::Transition(_)
        ));
        reg
    }

    #[test]
    fn test_codes() {
        assert_eq!(RegistrationState::Unregistered.code(), 0);
        assert_eq!(RegistrationState::Registering.code(), 1);
        assert_eq!(RegistrationState::Registered.code(), 2);
        assert_eq!(RegistrationState::Failed.code(), 3);
        assert_eq!(RegistrationState::from_code(2), Some(RegistrationState::Registered));
        assert_eq!(RegistrationState::from_code(7), None);
    }

    #[test]
    fn test_register_success() {
        let reg = registered();
        assert_eq!(reg.state(), RegistrationState::Registered);
        assert!(reg.keep_alive_enabled());
        assert!(reg.last_error().is_none());
    }

    #[test]
    fn test_register_is_noop_when_busy() {
        let mut reg = RegistrationController::new();
        reg.begin_register().unwrap();
        let generation = reg.generation();
        assert!(reg.begin_register().is_none());
        assert_eq!(reg.generation(), generation);

        let mut reg = registered();
        assert!(reg.begin_register().is_none());
        assert_eq!(reg.state(), RegistrationState::Registered);
    }

    #[test]
    fn test_register_failure_records_error() {
        let mut reg = RegistrationController::new();
        reg.begin_register().unwrap();
        let generation = reg.generation();

        let completion = reg.complete(
            generation,
            RequestKind::Register,
            Err(ClientError::protocol_error(403, "Forbidden")),
        );
        let Completion::Transition(t) = completion else {
            panic!("expected transition");
        };
        assert_eq!(t.state, RegistrationState::Failed);
        assert!(t.error_message().contains("Forbidden"));
        assert_eq!(reg.last_error().unwrap().code, 403);
        assert!(!reg.keep_alive_enabled());

        // Failed is re-enterable and the error clears on the next attempt
        let t = reg.begin_register().unwrap();
        assert_eq!((t.previous, t.state), (RegistrationState::Failed, RegistrationState::Registering));
        assert!(reg.last_error().is_none());
    }

    #[test]
    fn test_unregister_cancels_inflight_register() {
        let mut reg = RegistrationController::new();
        reg.begin_register().unwrap();
        let stale = reg.generation();

        let decision = reg.request_unregister(false);
        assert!(matches!(decision, UnregisterDecision::Immediate { notify_engine: true, .. }));

        assert_eq!(reg.complete(stale, RequestKind::Register, Ok(())), Completion::Stale);
        assert_eq!(reg.state(), RegistrationState::Unregistered);
    }

    #[test]
    fn test_unregister_during_call_still_cancels_inflight_register() {
        let mut reg = RegistrationController::new();
        reg.begin_register().unwrap();
        let stale = reg.generation();

        let decision = reg.request_unregister(true);
        assert!(matches!(decision, UnregisterDecision::Immediate { notify_engine: true, .. }));
        assert!(!reg.unregister_when_call_ends());

        assert_eq!(reg.complete(stale, RequestKind::Register, Ok(())), Completion::Stale);
        assert_eq!(reg.state(), RegistrationState::Unregistered);
        assert!(!reg.keep_alive_enabled());
        assert!(reg.on_call_ended().is_none());
    }

    #[test]
    fn test_register_clears_pending_deferred_unregister() {
        let mut reg = registered();
        reg.registration_lost(LastError { code: 503, message: "gone".into() }).unwrap();
        assert_eq!(reg.request_unregister(true), UnregisterDecision::Deferred);
        assert!(reg.unregister_when_call_ends());

        reg.begin_register().unwrap();
        assert!(!reg.unregister_when_call_ends());
        let generation = reg.generation();
        reg.complete(generation, RequestKind::Register, Ok(()));

        // The call ending no longer tears down the new registration
        assert!(reg.on_call_ended().is_none());
        assert_eq!(reg.state(), RegistrationState::Registered);
    }

    #[test]
    fn test_refresh_guards() {
        let mut reg = RegistrationController::new();
        assert!(reg.begin_refresh().is_none());

        reg.begin_register().unwrap();
        assert!(reg.begin_refresh().is_none(), "refresh while registering must be ignored");

        let mut reg = registered();
        let generation = reg.begin_refresh().unwrap();
        assert!(reg.begin_refresh().is_none(), "no double refresh");

        assert_eq!(reg.complete(generation, RequestKind::Refresh, Ok(())), Completion::Unchanged);
        assert!(reg.begin_refresh().is_some());
    }

    #[test]
    fn test_refresh_failure_moves_to_failed() {
        let mut reg = registered();
        let generation = reg.begin_refresh().unwrap();
        let completion = reg.complete(
            generation,
            RequestKind::Refresh,
            Err(ClientError::timeout("refresh_register", 10_000)),
        );
        let Completion::Transition(t) = completion else {
            panic!("expected transition");
        };
        assert_eq!(t.state, RegistrationState::Failed);
        assert_eq!(t.error.unwrap().code, 408);
    }

    #[test]
    fn test_deferred_unregister() {
        let mut reg = registered();
        assert_eq!(reg.request_unregister(true), UnregisterDecision::Deferred);
        assert_eq!(reg.state(), RegistrationState::Registered);
        assert!(reg.unregister_when_call_ends());

        let Some(UnregisterDecision::Immediate { transition, notify_engine }) = reg.on_call_ended()
        else {
            panic!("deferred unregister should run");
        };
        assert!(notify_engine);
        assert_eq!(transition.state, RegistrationState::Unregistered);
        assert!(!reg.unregister_when_call_ends());

        // Exactly one transition
        assert!(reg.on_call_ended().is_none());
    }

    #[test]
    fn test_unregister_without_call_never_sets_flag() {
        let mut reg = registered();
        reg.request_unregister(false);
        assert!(!reg.unregister_when_call_ends());
        assert_eq!(reg.request_unregister(true), UnregisterDecision::AlreadyUnregistered);
        assert!(!reg.unregister_when_call_ends());
    }

    #[test]
    fn test_registration_lost() {
        let mut reg = registered();
        let inflight = reg.begin_refresh().unwrap();

        let t = reg.registration_lost(LastError { code: 408, message: "expired".into() }).unwrap();
        assert_eq!(t.state, RegistrationState::Failed);
        assert_eq!(reg.complete(inflight, RequestKind::Refresh, Ok(())), Completion::Stale);
        assert!(reg.registration_lost(LastError { code: 0, message: String::new() }).is_none());
    }
}
