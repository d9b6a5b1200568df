//! Client builder
//!
//! There is no process-wide instance. A host builds one [`ClientManager`] per
//! login and passes the returned handle to whatever needs it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use softphone_core::{
//!     Account, AudioPlatform, ClientBuilder, Credentials, SipEngine, SoftphoneEventHandler,
//! };
//!
//! # async fn example(
//! #     engine: Arc<dyn SipEngine>,
//! #     audio: Arc<dyn AudioPlatform>,
//! #     observer: Arc<dyn SoftphoneEventHandler>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let account = Account::new(
//!     "sip:agent42@pbx.example.com",
//!     "sip:pbx.example.com:5060",
//!     Credentials::new("agent42", "s3cret"),
//! )
//! .with_profile([("tenant", "acme")]);
//!
//! let client = ClientBuilder::new()
//!     .account(account)
//!     .engine(engine)
//!     .audio_platform(audio)
//!     .event_handler(observer)
//!     .auto_answer(false)
//!     .login()
//!     .await?;
//!
//! client.register().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use super::config::{AudioConfig, ClientConfig};
use super::manager::ClientManager;
use crate::account::Account;
use crate::audio::AudioPlatform;
use crate::engine::SipEngine;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventFilter, EventSubscription, SoftphoneEventHandler};
use crate::keepalive::KeepAliveConfig;

/// Fluent constructor for [`ClientManager`]
#[derive(Default)]
pub struct ClientBuilder {
    account: Option<Account>,
    engine: Option<Arc<dyn SipEngine>>,
    audio: Option<Arc<dyn AudioPlatform>>,
    config: ClientConfig,
    subscriptions: Vec<EventSubscription>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn SipEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn audio_platform(mut self, audio: Arc<dyn AudioPlatform>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    pub fn audio_config(mut self, audio: AudioConfig) -> Self {
        self.config.audio = audio;
        self
    }

    pub fn auto_answer(mut self, enabled: bool) -> Self {
        self.config.auto_answer = enabled;
        self
    }

    /// Observer that receives every event from the first one on
    pub fn event_handler(mut self, handler: Arc<dyn SoftphoneEventHandler>) -> Self {
        self.subscriptions.push(EventSubscription::all_events(handler));
        self
    }

    pub fn filtered_event_handler(mut self, handler: Arc<dyn SoftphoneEventHandler>, filter: EventFilter) -> Self {
        self.subscriptions.push(EventSubscription::new(handler, filter));
        self
    }

    /// Validate, build the core and start its serialized context
    pub async fn login(self) -> ClientResult<Arc<ClientManager>> {
        let account = self
            .account
            .ok_or_else(|| ClientError::invalid_configuration("account", "an account is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| ClientError::invalid_configuration("engine", "a SIP engine is required"))?;
        let audio = self
            .audio
            .ok_or_else(|| ClientError::invalid_configuration("audio_platform", "an audio platform is required"))?;

        ClientManager::login(account, engine, audio, self.config, self.subscriptions).await
    }
}
