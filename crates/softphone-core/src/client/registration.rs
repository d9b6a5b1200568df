//! Registration operations for the client
//!
//! All of these run on the account's serialized context, so a refresh can
//! never race an unregister and results always apply in order.
//!
//! | Operation | Result |
//! |-----------|--------|
//! | [`register`](ClientManager::register) | state after the command; a no-op while registering or registered |
//! | [`refresh_register`](ClientManager::refresh_register) | whether a refresh request was sent |
//! | [`unregister`](ClientManager::unregister) | immediate, deferred until the call ends, or already unregistered |
//!
//! Outcomes of engine requests arrive later and are reported through the
//! registration callback: `Registering` (1) right away, then `Registered` (2)
//! or `Failed` (3) with a code and message.

use super::actor::Command;
use super::manager::ClientManager;
use crate::error::ClientResult;
use crate::registration::{RegistrationState, UnregisterOutcome};

impl ClientManager {
    /// Register the account bound at login
    ///
    /// Valid from `Unregistered` or `Failed`. The core never retries a failed
    /// registration by itself; call this again to retry.
    pub async fn register(&self) -> ClientResult<RegistrationState> {
        self.request(|reply| Command::Register { reply }).await?
    }

    /// Re-issue the registration before it expires
    ///
    /// Ignored unless registered, and while another refresh is in flight.
    pub async fn refresh_register(&self) -> ClientResult<bool> {
        self.request(|reply| Command::RefreshRegister { reply }).await?
    }

    /// Remove the registration
    ///
    /// With a live call the request is deferred and runs once the call ends.
    /// Any register or refresh still in flight is abandoned; its late result
    /// cannot bring the registration back.
    pub async fn unregister(&self) -> ClientResult<UnregisterOutcome> {
        self.request(|reply| Command::Unregister { reply }).await?
    }

    pub async fn registration_state(&self) -> ClientResult<RegistrationState> {
        Ok(self.status().await?.registration)
    }

    /// Report a reachability change from the host's network monitor
    ///
    /// Pushes a `networkChanged` event. When connectivity returns while
    /// registered (and the configuration allows it) a refresh is issued.
    pub async fn network_changed(&self, connected: bool) -> ClientResult<()> {
        self.request(|reply| Command::NetworkChanged { connected, reply }).await?
    }
}
