//! Audio routing
//!
//! ```text
//! ┌─────────────────────┐    ┌───────────────────────┐    ┌─────────────────────┐
//! │   ClientManager     │    │ AudioRouteController  │    │   AudioPlatform     │
//! │                     │    │                       │    │   (host supplied)   │
//! │ set_speaker_*()     │───▶│ speaker / volume /    │───▶│ route switch        │
//! │ set_voice_num()     │    │ gain / tone slot      │    │ hardware volume     │
//! │ play_*_tone()       │    │ (single writer lock)  │    │ tone playback       │
//! └─────────────────────┘    └───────────────────────┘    └─────────────────────┘
//!           ▲                            │
//!           │ ring / ring-back           ▼
//! ┌─────────────────────┐    ┌───────────────────────┐
//! │   call transitions  │    │    EventNotifier      │
//! └─────────────────────┘    └───────────────────────┘
//! ```

pub mod platform;
pub mod route;

pub use platform::{AudioError, AudioPlatform, AudioResult, GainRange, PlayingTone, Tone};
pub use route::{AudioRoute, AudioRouteController};
