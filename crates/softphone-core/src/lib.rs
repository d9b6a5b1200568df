//! Control core for SIP softphone clients
//!
//! This crate keeps a softphone's registration alive and drives its single
//! call session on behalf of a host application (call-center and agent apps,
//! mobile softphones). It owns the state machines and their timing; the
//! signaling engine and the platform audio layer are injected collaborators.
//!
//! # Components
//!
//! - **RegistrationController** - `Unregistered → Registering → Registered | Failed`,
//!   with request deadlines, cancellation by generation, and unregister
//!   deferred while a call is live
//! - **CallSessionController** - one call at a time:
//!   `Idle → Ringing | Answering → Active → Ending → Ended`
//! - **KeepAliveScheduler** - periodic liveness signal while registered
//! - **AudioRouteController** - speaker route, volume, gain, ring / ring-back tones
//! - **EventNotifier** - pushes every transition to the host observer
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use softphone_core::{
//!     Account, AudioPlatform, ClientBuilder, Credentials, SessionId, SipEngine,
//!     SoftphoneEventHandler, StateEvent,
//! };
//!
//! struct Observer;
//!
//! #[async_trait]
//! impl SoftphoneEventHandler for Observer {
//!     async fn on_registration_changed(&self, code: i32, error_message: String) {
//!         println!("registration -> {code} {error_message}");
//!     }
//!
//!     async fn on_state_event(&self, event: StateEvent) {
//!         println!("{}", event.to_json().unwrap_or_default());
//!     }
//! }
//!
//! # async fn run(engine: Arc<dyn SipEngine>, audio: Arc<dyn AudioPlatform>) -> softphone_core::ClientResult<()> {
//! let client = ClientBuilder::new()
//!     .account(Account::new(
//!         "sip:agent42@pbx.example.com",
//!         "sip:pbx.example.com",
//!         Credentials::new("agent42", "s3cret"),
//!     ))
//!     .engine(engine)
//!     .audio_platform(audio)
//!     .event_handler(Arc::new(Observer))
//!     .login()
//!     .await?;
//!
//! client.register().await?;
//! // ... an inbound call rings ...
//! client.answer_call(SessionId::INVALID).await?;
//! client.set_speaker_enabled(true).await?;
//! client.hang_up().await?;
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod audio;
pub mod call;
pub mod client;
pub mod engine;
pub mod error;
pub mod events;
pub mod keepalive;
pub mod logging;
pub mod registration;

pub use account::{Account, Credentials, UserProfile};
pub use audio::{AudioError, AudioPlatform, AudioResult, AudioRoute, GainRange, PlayingTone, Tone};
pub use call::{AnswerOutcome, CallDirection, CallHandle, CallSession, CallState, HangupOutcome, SessionId};
pub use client::{AudioConfig, Client, ClientBuilder, ClientConfig, ClientManager, CoreStatus};
pub use engine::{EngineEvent, EngineEventSink, SipEngine};
pub use error::{ClientError, ClientResult};
pub use events::{
    ClientEvent, EventFilter, EventKind, EventSubscription, SoftphoneEventHandler, StateEvent,
};
pub use keepalive::{KeepAliveConfig, KeepAliveStatus};
pub use registration::{LastError, RegistrationState, UnregisterOutcome};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
