//! Call operations for the client
//!
//! Only one call can be live. Inbound calls are announced by the engine and
//! show up as a `callStateChanged` event with state `ringing`; the host then
//! answers or hangs up.
//!
//! # Example
//!
//! ```rust,no_run
//! use softphone_core::{AnswerOutcome, ClientManager, SessionId};
//!
//! async fn accept_current(client: &ClientManager) -> Result<(), Box<dyn std::error::Error>> {
//!     // INVALID picks whichever call is ringing right now
//!     match client.answer_call(SessionId::INVALID).await? {
//!         AnswerOutcome::Answered => println!("connected"),
//!         AnswerOutcome::AlreadyActive => println!("already talking"),
//!         AnswerOutcome::InvalidSession => println!("nothing to answer"),
//!     }
//!     client.hang_up().await?;
//!     Ok(())
//! }
//! ```

use super::actor::Command;
use super::manager::ClientManager;
use crate::call::{AnswerOutcome, CallSession, HangupOutcome, SessionId};
use crate::error::ClientResult;

impl ClientManager {
    /// Answer the ringing call
    ///
    /// `session_id` must match the ringing call, or be [`SessionId::INVALID`]
    /// to mean "the current one". A stale or mismatched handle returns
    /// [`AnswerOutcome::InvalidSession`] and changes nothing.
    pub async fn answer_call(&self, session_id: SessionId) -> ClientResult<AnswerOutcome> {
        self.request(|reply| Command::AnswerCall { session_id, reply }).await?
    }

    /// End the live call, if any
    ///
    /// Idempotent. The call reaches `Ended` once the engine confirms; any
    /// unregister deferred behind the call runs right after.
    pub async fn hang_up(&self) -> ClientResult<HangupOutcome> {
        self.request(|reply| Command::HangUp { reply }).await?
    }

    /// Place an outbound call
    ///
    /// Requires a registered account and no live call. Returns the handle
    /// allocated for the new session.
    pub async fn make_call(&self, target: impl Into<String>) -> ClientResult<SessionId> {
        let target = target.into();
        self.request(|reply| Command::MakeCall { target, reply }).await?
    }

    /// Handle of the live call, or [`SessionId::INVALID`]
    pub async fn active_session_id(&self) -> ClientResult<SessionId> {
        Ok(self.status().await?.active_session_id)
    }

    pub async fn call_session(&self) -> ClientResult<Option<CallSession>> {
        Ok(self.status().await?.session)
    }
}
