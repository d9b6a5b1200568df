//! Keep-alive scheduler
//!
//! While the account is registered a background task fires a liveness signal
//! at a fixed cadence (plus a little jitter so a fleet of clients does not
//! tick in lockstep). The task never touches registration state: each tick
//! hands its generation to a callback, and the owner posts the engine result
//! back onto its own serialized context.
//!
//! A missed keep-alive is a warning, not a failure. Only the engine's own
//! registration-expiry callback may move the account out of `Registered`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Largest jitter fraction accepted by [`KeepAliveConfig::validate`]
pub const MAX_JITTER: f64 = 0.5;

/// Keep-alive cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// Foreground interval between ticks (milliseconds)
    pub interval_ms: u64,
    /// Interval used while the host app is in the background; `None` keeps the
    /// foreground interval
    pub background_interval_ms: Option<u64>,
    /// Random spread applied to every interval, as a fraction (0.1 = ±10%)
    pub jitter: f64,
}

impl KeepAliveConfig {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms, ..Self::default() }
    }

    pub fn with_background_interval_ms(mut self, interval_ms: u64) -> Self {
        self.background_interval_ms = Some(interval_ms);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_millis(self.background_interval_ms.unwrap_or(self.interval_ms))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.interval_ms == 0 {
            return Err(ClientError::invalid_configuration("keep_alive.interval_ms", "must be greater than zero"));
        }
        if self.background_interval_ms == Some(0) {
            return Err(ClientError::invalid_configuration(
                "keep_alive.background_interval_ms",
                "must be greater than zero",
            ));
        }
        if !(0.0..=MAX_JITTER).contains(&self.jitter) {
            return Err(ClientError::invalid_configuration(
                "keep_alive.jitter",
                format!("must be between 0.0 and {MAX_JITTER}"),
            ));
        }
        Ok(())
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000, background_interval_ms: None, jitter: 0.1 }
    }
}

/// Snapshot of the scheduler for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAliveStatus {
    pub enabled: bool,
    pub background: bool,
    pub interval_ms: u64,
    pub last_fired: Option<DateTime<Utc>>,
    pub ticks_sent: u64,
    pub failures: u64,
}

struct RunningTimer {
    handle: JoinHandle<()>,
    cadence: watch::Sender<Duration>,
    generation: u64,
}

/// Periodic liveness task tied to the registered state
pub struct KeepAliveScheduler {
    config: KeepAliveConfig,
    timer: Option<RunningTimer>,
    next_generation: u64,
    background: bool,
    last_fired: Option<DateTime<Utc>>,
    ticks_sent: u64,
    failures: u64,
}

impl KeepAliveScheduler {
    pub fn new(config: KeepAliveConfig) -> Self {
        Self {
            config,
            timer: None,
            next_generation: 0,
            background: false,
            last_fired: None,
            ticks_sent: 0,
            failures: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Interval currently in effect
    pub fn current_interval(&self) -> Duration {
        if self.background {
            self.config.background_interval()
        } else {
            self.config.interval()
        }
    }

    /// Start ticking. `on_tick` receives the timer generation and is awaited
    /// before the next interval starts. Starting a running scheduler is a
    /// no-op.
    pub fn start<F, Fut>(&mut self, mut on_tick: F)
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.timer.is_some() {
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let jitter = self.config.jitter;
        let (cadence, mut cadence_rx) = watch::channel(self.current_interval());

        let handle = tokio::spawn(async move {
            let mut period = *cadence_rx.borrow_and_update();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(jittered(period, jitter)) => {
                        on_tick(generation).await;
                    }
                    changed = cadence_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        period = *cadence_rx.borrow_and_update();
                        debug!(generation, interval_ms = period.as_millis() as u64, "Keep-alive cadence changed");
                    }
                }
            }
        });

        debug!(generation, interval_ms = self.current_interval().as_millis() as u64, "Keep-alive started");
        self.timer = Some(RunningTimer { handle, cadence, generation });
    }

    /// Stop ticking. Results of ticks already in flight become stale.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            debug!(generation = timer.generation, "Keep-alive stopped");
        }
    }

    /// Switch between foreground and background cadence
    pub fn set_background(&mut self, background: bool) {
        if self.background == background {
            return;
        }
        self.background = background;
        let period = self.current_interval();
        if let Some(timer) = &self.timer {
            // The timer task only stops when this sender is dropped
            let _ = timer.cadence.send(period);
        }
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Record the outcome of a tick
    ///
    /// Returns `false` for results from a timer that has since been stopped;
    /// those are ignored.
    pub fn record_result(&mut self, generation: u64, result: &ClientResult<()>) -> bool {
        let current = self.timer.as_ref().map(|t| t.generation);
        if current != Some(generation) {
            return false;
        }

        self.last_fired = Some(Utc::now());
        self.ticks_sent += 1;
        if let Err(err) = result {
            self.failures += 1;
            warn!(generation, error = %err, "Keep-alive failed");
        }
        true
    }

    pub fn status(&self) -> KeepAliveStatus {
        KeepAliveStatus {
            enabled: self.is_running(),
            background: self.background,
            interval_ms: self.current_interval().as_millis() as u64,
            last_fired: self.last_fired,
            ticks_sent: self.ticks_sent,
            failures: self.failures,
        }
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn jittered(period: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return period;
    }
    let factor = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * jitter;
    period.mul_f64(factor.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fast(interval_ms: u64) -> KeepAliveConfig {
        KeepAliveConfig::new(interval_ms).with_jitter(0.0)
    }

    #[test]
    fn test_config_validation() {
        assert!(KeepAliveConfig::default().validate().is_ok());
        assert!(KeepAliveConfig::new(0).validate().is_err());
        assert!(KeepAliveConfig::default().with_jitter(0.9).validate().is_err());
        assert!(KeepAliveConfig::default().with_background_interval_ms(0).validate().is_err());
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let period = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(period, 0.1);
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100), "{d:?}");
        }
        assert_eq!(jittered(period, 0.0), period);
    }

    #[tokio::test]
    async fn test_ticks_until_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = KeepAliveScheduler::new(fast(10));

        scheduler.start(move |generation| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(generation);
            }
        });
        assert!(scheduler.is_running());

        let generation = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.record_result(generation, &Ok(())));
        assert_eq!(scheduler.status().ticks_sent, 1);
        assert!(scheduler.status().last_fired.is_some());

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(!scheduler.record_result(generation, &Ok(())), "stopped timer results are stale");
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let mut scheduler = KeepAliveScheduler::new(fast(60_000));
        scheduler.start(|_| async {});

        let generation = scheduler.next_generation;
        assert!(scheduler.record_result(generation, &Err(ClientError::network_error("no route"))));
        assert!(scheduler.is_running());
        assert_eq!(scheduler.status().failures, 1);
    }

    #[tokio::test]
    async fn test_background_cadence() {
        let mut scheduler =
            KeepAliveScheduler::new(fast(25_000).with_background_interval_ms(300_000));
        scheduler.start(|_| async {});

        scheduler.set_background(true);
        assert_eq!(scheduler.status().interval_ms, 300_000);
        scheduler.set_background(false);
        assert_eq!(scheduler.current_interval(), Duration::from_millis(25_000));
    }
}
