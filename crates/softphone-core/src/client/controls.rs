//! Audio and app-lifecycle controls
//!
//! Audio commands bypass the account's serialized context and go straight to
//! the route controller: they only need ordering against the audio device,
//! not against registration or call transitions. Failures are returned to the
//! caller and are not emitted as events.

use super::actor::Command;
use super::manager::ClientManager;
use crate::audio::{AudioRoute, GainRange, PlayingTone};
use crate::error::ClientResult;

impl ClientManager {
    /// Route output to the loudspeaker or back to the handset
    pub async fn set_speaker_enabled(&self, enabled: bool) -> ClientResult<()> {
        self.audio.set_speaker_enabled(enabled).await
    }

    /// Last route the device accepted
    pub async fn is_speaker_enabled(&self) -> bool {
        self.audio.is_speaker_enabled().await
    }

    /// Set the output volume; out-of-range levels are clamped, not rejected
    pub async fn set_voice_num(&self, level: i32) -> ClientResult<i32> {
        self.audio.set_voice_num(level).await
    }

    /// Set the microphone gain; out-of-range levels are clamped, not rejected
    pub async fn set_microphone(&self, level: i32) -> ClientResult<i32> {
        self.audio.set_microphone(level).await
    }

    pub fn output_volume_range(&self) -> GainRange {
        self.audio.output_volume_range()
    }

    pub fn microphone_gain_range(&self) -> GainRange {
        self.audio.microphone_gain_range()
    }

    /// Start the ring tone, stopping the ring-back tone if it was playing
    pub async fn play_ring_tone(&self) -> ClientResult<()> {
        self.audio.play_ring_tone().await
    }

    pub async fn stop_ring_tone(&self) -> ClientResult<()> {
        self.audio.stop_ring_tone().await
    }

    /// Start the ring-back tone, stopping the ring tone if it was playing
    pub async fn play_ring_back_tone(&self) -> ClientResult<()> {
        self.audio.play_ring_back_tone().await
    }

    pub async fn stop_ring_back_tone(&self) -> ClientResult<()> {
        self.audio.stop_ring_back_tone().await
    }

    pub async fn playing_tone(&self) -> PlayingTone {
        self.audio.playing_tone().await
    }

    pub async fn audio_route(&self) -> AudioRoute {
        self.audio.route().await
    }

    /// The host app moved to the background: keep-alive switches to the
    /// background interval. Registration state is untouched.
    pub async fn enter_background(&self) -> ClientResult<()> {
        self.request(|reply| Command::SetBackground { background: true, reply }).await?
    }

    /// Back in the foreground: restore the foreground keep-alive interval
    pub async fn enter_foreground(&self) -> ClientResult<()> {
        self.request(|reply| Command::SetBackground { background: false, reply }).await?
    }
}
