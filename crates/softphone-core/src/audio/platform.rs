//! Platform audio abstraction
//!
//! The core never touches audio hardware. It drives an [`AudioPlatform`]
//! implementation supplied by the host (CoreAudio/AVAudioSession, Android
//! AudioManager, a test mock) and only keeps track of the logical route.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Inclusive range of levels supported by a device control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainRange {
    pub min: i32,
    pub max: i32,
}

impl GainRange {
    /// Build a range; bounds given in the wrong order are swapped
    pub fn new(min: i32, max: i32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Same range with the bounds in order
    pub fn normalized(&self) -> Self {
        Self::new(self.min, self.max)
    }

    /// Whether `min <= max`. Literals and deserialized values skip the
    /// ordering done by [`GainRange::new`].
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    /// Clamp a requested level into the range
    pub fn clamp(&self, level: i32) -> i32 {
        let range = self.normalized();
        level.clamp(range.min, range.max)
    }

    pub fn contains(&self, level: i32) -> bool {
        (self.min..=self.max).contains(&level)
    }
}

impl fmt::Display for GainRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A call-progress tone the platform can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    /// Local alert for an incoming call
    RingTone,
    /// Remote ringing feedback for an outgoing call
    RingBackTone,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::RingTone => write!(f, "ring tone"),
            Tone::RingBackTone => write!(f, "ring-back tone"),
        }
    }
}

/// Single-slot record of what is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayingTone {
    #[default]
    None,
    RingTone,
    RingBackTone,
}

impl From<Tone> for PlayingTone {
    fn from(tone: Tone) -> Self {
        match tone {
            Tone::RingTone => PlayingTone::RingTone,
            Tone::RingBackTone => PlayingTone::RingBackTone,
        }
    }
}

impl PlayingTone {
    pub fn tone(&self) -> Option<Tone> {
        match self {
            PlayingTone::None => None,
            PlayingTone::RingTone => Some(Tone::RingTone),
            PlayingTone::RingBackTone => Some(Tone::RingBackTone),
        }
    }
}

/// Errors reported by the platform audio layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The requested output route does not exist right now
    RouteUnavailable { route: String },
    /// Another user of the device holds it
    DeviceBusy { reason: String },
    /// Tone playback could not start or stop
    PlaybackFailed { reason: String },
    /// Platform-specific error
    PlatformError { message: String },
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::RouteUnavailable { route } => {
                write!(f, "Audio route unavailable: {}", route)
            }
            AudioError::DeviceBusy { reason } => {
                write!(f, "Audio device busy: {}", reason)
            }
            AudioError::PlaybackFailed { reason } => {
                write!(f, "Tone playback failed: {}", reason)
            }
            AudioError::PlatformError { message } => {
                write!(f, "Platform audio error: {}", message)
            }
        }
    }
}

impl std::error::Error for AudioError {}

impl From<AudioError> for ClientError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::RouteUnavailable { route } => ClientError::ResourceUnavailable { resource: route },
            AudioError::DeviceBusy { .. } => ClientError::ResourceUnavailable { resource: err.to_string() },
            AudioError::PlaybackFailed { .. } | AudioError::PlatformError { .. } => {
                ClientError::AudioDeviceError { reason: err.to_string() }
            }
        }
    }
}

/// Result type for platform audio operations
pub type AudioResult<T> = std::result::Result<T, AudioError>;

/// Audio collaborator implemented by the host platform
///
/// All calls are made while the route controller holds its lock, so an
/// implementation never sees two commands at once.
#[async_trait::async_trait]
pub trait AudioPlatform: Send + Sync + std::fmt::Debug {
    /// Route output to the loudspeaker (`true`) or the handset (`false`)
    async fn set_speaker(&self, enabled: bool) -> AudioResult<()>;

    async fn set_output_volume(&self, level: i32) -> AudioResult<()>;

    async fn set_microphone_gain(&self, level: i32) -> AudioResult<()>;

    /// Range accepted by [`set_output_volume`](Self::set_output_volume)
    fn output_volume_range(&self) -> GainRange;

    /// Range accepted by [`set_microphone_gain`](Self::set_microphone_gain)
    fn microphone_gain_range(&self) -> GainRange;

    async fn start_tone(&self, tone: Tone) -> AudioResult<()>;

    async fn stop_tone(&self, tone: Tone) -> AudioResult<()>;
}
