//! Logical audio route controller
//!
//! Tracks speaker routing, output volume, microphone gain and which
//! call-progress tone is playing, and forwards each change to the
//! [`AudioPlatform`]. The platform is an exclusive resource with a single
//! writer: every command holds the controller's lock for the whole platform
//! round-trip, so concurrent toggles from the host and tone changes driven by
//! call events are applied one at a time.
//!
//! The recorded state only changes after the platform accepted a command;
//! [`AudioRouteController::is_speaker_enabled`] therefore reports the last
//! route that was actually applied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::platform::{AudioPlatform, GainRange, PlayingTone, Tone};
use crate::client::config::AudioConfig;
use crate::error::ClientResult;
use crate::events::{EventNotifier, StateEvent};

/// Applied audio route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRoute {
    pub speaker_enabled: bool,
    pub output_volume: i32,
    pub microphone_gain: i32,
    pub playing_tone: PlayingTone,
}

pub struct AudioRouteController {
    platform: Arc<dyn AudioPlatform>,
    notifier: Arc<EventNotifier>,
    output_range: GainRange,
    microphone_range: GainRange,
    route: Mutex<AudioRoute>,
}

impl AudioRouteController {
    /// Ranges come from the configuration when overridden, otherwise from the
    /// platform. Levels start at the top of each range until a value has been
    /// applied.
    pub fn new(platform: Arc<dyn AudioPlatform>, config: &AudioConfig, notifier: Arc<EventNotifier>) -> Self {
        let output_range = ordered_range(
            "output volume",
            config.output_volume_range.unwrap_or_else(|| platform.output_volume_range()),
        );
        let microphone_range = ordered_range(
            "microphone gain",
            config.microphone_gain_range.unwrap_or_else(|| platform.microphone_gain_range()),
        );

        Self {
            platform,
            notifier,
            output_range,
            microphone_range,
            route: Mutex::new(AudioRoute {
                speaker_enabled: false,
                output_volume: output_range.max,
                microphone_gain: microphone_range.max,
                playing_tone: PlayingTone::None,
            }),
        }
    }

    pub fn output_volume_range(&self) -> GainRange {
        self.output_range
    }

    pub fn microphone_gain_range(&self) -> GainRange {
        self.microphone_range
    }

    /// Apply the initial volume and gain from the configuration
    pub async fn apply_preferences(&self, config: &AudioConfig) -> ClientResult<()> {
        if let Some(level) = config.initial_output_volume {
            self.set_voice_num(level).await?;
        }
        if let Some(level) = config.initial_microphone_gain {
            self.set_microphone(level).await?;
        }
        Ok(())
    }

    pub async fn route(&self) -> AudioRoute {
        *self.route.lock().await
    }

    pub async fn is_speaker_enabled(&self) -> bool {
        self.route.lock().await.speaker_enabled
    }

    pub async fn playing_tone(&self) -> PlayingTone {
        self.route.lock().await.playing_tone
    }

    /// Switch output between handset and loudspeaker
    pub async fn set_speaker_enabled(&self, enabled: bool) -> ClientResult<()> {
        {
            let mut route = self.route.lock().await;
            if route.speaker_enabled == enabled {
                return Ok(());
            }
            if let Err(e) = self.platform.set_speaker(enabled).await {
                warn!(enabled, error = %e, "Speaker route change rejected");
                return Err(e.into());
            }
            route.speaker_enabled = enabled;
        }

        info!(enabled, "Speaker route changed");
        self.notifier.state(StateEvent::speaker_changed(enabled));
        Ok(())
    }

    /// Set the output volume, clamped to the supported range
    ///
    /// Returns the level actually applied.
    pub async fn set_voice_num(&self, level: i32) -> ClientResult<i32> {
        let applied = self.output_range.clamp(level);
        {
            let mut route = self.route.lock().await;
            self.platform.set_output_volume(applied).await?;
            route.output_volume = applied;
        }

        debug!(requested = level, applied, "Output volume set");
        self.notifier.state(StateEvent::output_volume_changed(level, applied));
        Ok(applied)
    }

    /// Set the microphone gain, clamped to the supported range
    ///
    /// Returns the level actually applied.
    pub async fn set_microphone(&self, level: i32) -> ClientResult<i32> {
        let applied = self.microphone_range.clamp(level);
        {
            let mut route = self.route.lock().await;
            self.platform.set_microphone_gain(applied).await?;
            route.microphone_gain = applied;
        }

        debug!(requested = level, applied, "Microphone gain set");
        self.notifier.state(StateEvent::microphone_gain_changed(level, applied));
        Ok(applied)
    }

    pub async fn play_ring_tone(&self) -> ClientResult<()> {
        self.play(Tone::RingTone).await
    }

    pub async fn stop_ring_tone(&self) -> ClientResult<()> {
        self.stop(Tone::RingTone).await
    }

    pub async fn play_ring_back_tone(&self) -> ClientResult<()> {
        self.play(Tone::RingBackTone).await
    }

    pub async fn stop_ring_back_tone(&self) -> ClientResult<()> {
        self.stop(Tone::RingBackTone).await
    }

    /// Stop whatever tone is playing
    pub async fn stop_tones(&self) -> ClientResult<()> {
        let tone = self.route.lock().await.playing_tone.tone();
        match tone {
            Some(tone) => self.stop(tone).await,
            None => Ok(()),
        }
    }

    async fn play(&self, tone: Tone) -> ClientResult<()> {
        let previous = {
            let mut route = self.route.lock().await;
            let previous = route.playing_tone;
            if previous == PlayingTone::from(tone) {
                return Ok(());
            }

            // Only one tone slot: the other tone has to go first
            if let Some(other) = previous.tone() {
                self.platform.stop_tone(other).await?;
                route.playing_tone = PlayingTone::None;
            }
            if let Err(e) = self.platform.start_tone(tone).await {
                warn!(%tone, error = %e, "Tone playback failed");
                drop(route);
                if previous != PlayingTone::None {
                    self.notifier.state(StateEvent::tone_changed(previous, PlayingTone::None));
                }
                return Err(e.into());
            }
            route.playing_tone = PlayingTone::from(tone);
            previous
        };

        debug!(%tone, ?previous, "Tone started");
        self.notifier.state(StateEvent::tone_changed(previous, PlayingTone::from(tone)));
        Ok(())
    }

    async fn stop(&self, tone: Tone) -> ClientResult<()> {
        {
            let mut route = self.route.lock().await;
            if route.playing_tone != PlayingTone::from(tone) {
                return Ok(());
            }
            self.platform.stop_tone(tone).await?;
            route.playing_tone = PlayingTone::None;
        }

        debug!(%tone, "Tone stopped");
        self.notifier.state(StateEvent::tone_changed(PlayingTone::from(tone), PlayingTone::None));
        Ok(())
    }
}

fn ordered_range(control: &str, range: GainRange) -> GainRange {
    if !range.is_ordered() {
        warn!(control, %range, "Device reported a reversed range; swapping bounds");
    }
    range.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::platform::{AudioError, AudioResult};
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Default)]
    struct FakePlatform {
        speaker_unavailable: AtomicBool,
        reversed_ranges: AtomicBool,
        calls: StdMutex<Vec<String>>,
    }

    impl FakePlatform {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl AudioPlatform for FakePlatform {
        async fn set_speaker(&self, enabled: bool) -> AudioResult<()> {
            if self.speaker_unavailable.load(Ordering::SeqCst) {
                return Err(AudioError::RouteUnavailable { route: "loudspeaker".into() });
            }
            self.record(format!("speaker:{enabled}"));
            Ok(())
        }

        async fn set_output_volume(&self, level: i32) -> AudioResult<()> {
            self.record(format!("volume:{level}"));
            Ok(())
        }

        async fn set_microphone_gain(&self, level: i32) -> AudioResult<()> {
            self.record(format!("gain:{level}"));
            Ok(())
        }

        fn output_volume_range(&self) -> GainRange {
            if self.reversed_ranges.load(Ordering::SeqCst) {
                return GainRange { min: 10, max: 0 };
            }
            GainRange::new(0, 10)
        }

        fn microphone_gain_range(&self) -> GainRange {
            if self.reversed_ranges.load(Ordering::SeqCst) {
                return GainRange { min: 5, max: -5 };
            }
            GainRange::new(-5, 5)
        }

        async fn start_tone(&self, tone: Tone) -> AudioResult<()> {
            self.record(format!("start:{tone:?}"));
            Ok(())
        }

        async fn stop_tone(&self, tone: Tone) -> AudioResult<()> {
            self.record(format!("stop:{tone:?}"));
            Ok(())
        }
    }

    fn controller(config: AudioConfig) -> (AudioRouteController, Arc<FakePlatform>) {
        let platform = Arc::new(FakePlatform::default());
        let controller =
            AudioRouteController::new(platform.clone(), &config, Arc::new(EventNotifier::new(16)));
        (controller, platform)
    }

    #[tokio::test]
    async fn test_speaker_toggle() {
        let (audio, platform) = controller(AudioConfig::default());

        audio.set_speaker_enabled(true).await.unwrap();
        assert!(audio.is_speaker_enabled().await);
        audio.set_speaker_enabled(false).await.unwrap();
        assert!(!audio.is_speaker_enabled().await);

        // Repeating the current route does not hit the device
        audio.set_speaker_enabled(false).await.unwrap();
        assert_eq!(platform.calls(), vec!["speaker:true", "speaker:false"]);
    }

    #[tokio::test]
    async fn test_rejected_route_keeps_last_applied() {
        let (audio, platform) = controller(AudioConfig::default());
        platform.speaker_unavailable.store(true, Ordering::SeqCst);

        let err = audio.set_speaker_enabled(true).await.unwrap_err();
        assert_eq!(err, ClientError::resource_unavailable("loudspeaker"));
        assert!(!audio.is_speaker_enabled().await);
    }

    #[tokio::test]
    async fn test_levels_are_clamped() {
        let (audio, platform) = controller(AudioConfig::default());

        assert_eq!(audio.set_voice_num(42).await.unwrap(), 10);
        assert_eq!(audio.set_voice_num(-3).await.unwrap(), 0);
        assert_eq!(audio.set_microphone(-9).await.unwrap(), -5);
        assert_eq!(audio.route().await.output_volume, 0);
        assert_eq!(platform.calls(), vec!["volume:10", "volume:0", "gain:-5"]);
    }

    #[tokio::test]
    async fn test_reversed_platform_range_is_reordered() {
        let platform = Arc::new(FakePlatform::default());
        platform.reversed_ranges.store(true, Ordering::SeqCst);
        let audio =
            AudioRouteController::new(platform.clone(), &AudioConfig::default(), Arc::new(EventNotifier::new(16)));

        assert_eq!(audio.output_volume_range(), GainRange::new(0, 10));
        assert_eq!(audio.microphone_gain_range(), GainRange::new(-5, 5));
        assert_eq!(audio.set_voice_num(15).await.unwrap(), 10);
        assert_eq!(audio.set_microphone(-8).await.unwrap(), -5);

        let preferences = AudioConfig::default().with_initial_output_volume(-4);
        audio.apply_preferences(&preferences).await.unwrap();
        assert_eq!(audio.route().await.output_volume, 0);
    }

    #[tokio::test]
    async fn test_config_overrides_platform_range() {
        let config = AudioConfig::default().with_output_volume_range(GainRange::new(0, 100));
        let (audio, _) = controller(config);
        assert_eq!(audio.output_volume_range(), GainRange::new(0, 100));
        assert_eq!(audio.set_voice_num(42).await.unwrap(), 42);
        assert_eq!(audio.microphone_gain_range(), GainRange::new(-5, 5));
    }

    #[tokio::test]
    async fn test_tones_are_mutually_exclusive() {
        let (audio, platform) = controller(AudioConfig::default());

        audio.play_ring_tone().await.unwrap();
        audio.play_ring_back_tone().await.unwrap();
        assert_eq!(audio.playing_tone().await, PlayingTone::RingBackTone);
        assert_eq!(
            platform.calls(),
            vec!["start:RingTone", "stop:RingTone", "start:RingBackTone"]
        );

        // Stopping a tone that is not playing is a no-op
        audio.stop_ring_tone().await.unwrap();
        assert_eq!(audio.playing_tone().await, PlayingTone::RingBackTone);

        audio.stop_ring_back_tone().await.unwrap();
        audio.stop_ring_back_tone().await.unwrap();
        assert_eq!(audio.playing_tone().await, PlayingTone::None);
        assert_eq!(platform.calls().len(), 4);
    }
}
