//! Softphone core configuration
//!
//! Everything here is supplied by the host at login. Two things are
//! deliberately absent:
//!
//! - **Registration retry policy** - the core never retries a failed
//!   registration; hosts call `register()` again when they decide to.
//! - **Device volume ranges** - taken from the [`AudioPlatform`] unless the
//!   host overrides them in [`AudioConfig`].
//!
//! # Example
//!
//! ```rust
//! use softphone_core::{AudioConfig, ClientConfig, GainRange, KeepAliveConfig};
//!
//! let config = ClientConfig::new()
//!     .with_register_timeout_ms(5_000)
//!     .with_keep_alive(KeepAliveConfig::new(20_000).with_background_interval_ms(120_000))
//!     .with_audio(
//!         AudioConfig::default()
//!             .with_output_volume_range(GainRange::new(0, 10))
//!             .with_initial_output_volume(7),
//!     )
//!     .with_auto_answer(true);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.register_timeout().as_millis(), 5_000);
//! ```
//!
//! [`AudioPlatform`]: crate::audio::AudioPlatform

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::GainRange;
use crate::error::{ClientError, ClientResult};
use crate::keepalive::KeepAliveConfig;

/// Audio preferences applied at login
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Override for the platform-reported output volume range
    pub output_volume_range: Option<GainRange>,
    /// Override for the platform-reported microphone gain range
    pub microphone_gain_range: Option<GainRange>,
    /// Output volume applied (clamped) at login
    pub initial_output_volume: Option<i32>,
    /// Microphone gain applied (clamped) at login
    pub initial_microphone_gain: Option<i32>,
    /// Switch to the loudspeaker whenever a call becomes active
    pub speaker_on_answer: bool,
}

impl AudioConfig {
    pub fn with_output_volume_range(mut self, range: GainRange) -> Self {
        self.output_volume_range = Some(range);
        self
    }

    pub fn with_microphone_gain_range(mut self, range: GainRange) -> Self {
        self.microphone_gain_range = Some(range);
        self
    }

    pub fn with_initial_output_volume(mut self, level: i32) -> Self {
        self.initial_output_volume = Some(level);
        self
    }

    pub fn with_initial_microphone_gain(mut self, level: i32) -> Self {
        self.initial_microphone_gain = Some(level);
        self
    }

    pub fn with_speaker_on_answer(mut self, enabled: bool) -> Self {
        self.speaker_on_answer = enabled;
        self
    }

    /// Range overrides must have their bounds in order
    pub fn validate(&self) -> ClientResult<()> {
        let overrides = [
            ("audio.output_volume_range", self.output_volume_range),
            ("audio.microphone_gain_range", self.microphone_gain_range),
        ];
        for (field, range) in overrides {
            if let Some(range) = range {
                if !range.is_ordered() {
                    return Err(ClientError::invalid_configuration(
                        field,
                        format!("min {} is greater than max {}", range.min, range.max),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Configuration for a softphone core instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Response deadline for register and refresh requests (milliseconds)
    pub register_timeout_ms: u64,
    /// Deadline for every other engine request (milliseconds)
    pub engine_timeout_ms: u64,
    /// Keep-alive cadence
    pub keep_alive: KeepAliveConfig,
    /// Audio preferences
    pub audio: AudioConfig,
    /// Answer incoming calls without waiting for the host
    pub auto_answer: bool,
    /// Issue a registration refresh when connectivity comes back
    pub refresh_on_network_restore: bool,
    /// Capacity of the command queue feeding the core
    pub command_queue_depth: usize,
    /// Backlog kept for each event stream subscriber
    pub event_channel_capacity: usize,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.register_timeout_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn with_register_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.register_timeout_ms = timeout_ms;
        self
    }

    pub fn with_engine_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.engine_timeout_ms = timeout_ms;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_auto_answer(mut self, enabled: bool) -> Self {
        self.auto_answer = enabled;
        self
    }

    pub fn with_refresh_on_network_restore(mut self, enabled: bool) -> Self {
        self.refresh_on_network_restore = enabled;
        self
    }

    pub fn with_command_queue_depth(mut self, depth: usize) -> Self {
        self.command_queue_depth = depth;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> ClientResult<()> {
        if self.register_timeout_ms == 0 {
            return Err(ClientError::invalid_configuration("register_timeout_ms", "must be greater than zero"));
        }
        if self.engine_timeout_ms == 0 {
            return Err(ClientError::invalid_configuration("engine_timeout_ms", "must be greater than zero"));
        }
        if self.command_queue_depth == 0 {
            return Err(ClientError::invalid_configuration("command_queue_depth", "must be greater than zero"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ClientError::invalid_configuration("event_channel_capacity", "must be greater than zero"));
        }
        self.keep_alive.validate()?;
        self.audio.validate()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            register_timeout_ms: 10_000,
            engine_timeout_ms: 5_000,
            keep_alive: KeepAliveConfig::default(),
            audio: AudioConfig::default(),
            auto_answer: false,
            refresh_on_network_restore: true,
            command_queue_depth: 64,
            event_channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.register_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine_timeout(), Duration::from_secs(5));
        assert!(!config.auto_answer);
        assert!(config.refresh_on_network_restore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_names_the_field() {
        let err = ClientConfig::new().with_register_timeout_ms(0).validate().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration { ref field, .. } if field == "register_timeout_ms"));

        let err = ClientConfig::new()
            .with_keep_alive(KeepAliveConfig::new(0))
            .validate()
            .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_reversed_range_override_is_rejected() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "register_timeout_ms": 10000,
                "engine_timeout_ms": 5000,
                "keep_alive": { "interval_ms": 30000, "background_interval_ms": null, "jitter": 0.1 },
                "audio": {
                    "output_volume_range": { "min": 10, "max": 0 },
                    "microphone_gain_range": null,
                    "initial_output_volume": 5,
                    "initial_microphone_gain": null,
                    "speaker_on_answer": false
                },
                "auto_answer": false,
                "refresh_on_network_restore": true,
                "command_queue_depth": 64,
                "event_channel_capacity": 256
            }"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration { ref field, .. } if field == "audio.output_volume_range"));

        let reversed_gain = AudioConfig { microphone_gain_range: Some(GainRange { min: 3, max: -3 }), ..Default::default() };
        let err = ClientConfig::new().with_audio(reversed_gain).validate().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration { ref field, .. } if field == "audio.microphone_gain_range"));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ClientConfig::new()
            .with_auto_answer(true)
            .with_audio(AudioConfig::default().with_microphone_gain_range(GainRange::new(-6, 6)));

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
