//! Client handle, serialized context and configuration
//!
//! ```text
//! ┌──────────────────────┐  commands   ┌────────────────────────────────┐
//! │    ClientManager     │────────────▶│           CoreActor            │
//! │  (host-facing API)   │◀────────────│  RegistrationController        │
//! └──────────┬───────────┘   replies   │  CallSessionController         │
//!            │ audio                   │  KeepAliveScheduler            │
//!            ▼                         └───────┬────────────────▲───────┘
//! ┌──────────────────────┐                     │ worker tasks   │ results,
//! │ AudioRouteController │◀── tones ───────────┤                │ engine events
//! └──────────────────────┘                     ▼                │
//!                                      ┌────────────────────────┴───────┐
//!                                      │        SipEngine (host)        │
//!                                      └────────────────────────────────┘
//! ```

pub(crate) mod actor;
pub mod builder;
pub mod calls;
pub mod config;
pub mod controls;
pub mod manager;
pub mod recovery;
pub mod registration;
pub mod types;

pub use builder::ClientBuilder;
pub use config::{AudioConfig, ClientConfig};
pub use manager::ClientManager;
pub use types::CoreStatus;

/// Short alias used by hosts
pub type Client = ClientManager;
