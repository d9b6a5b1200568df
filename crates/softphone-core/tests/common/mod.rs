//! Shared fakes for the softphone core integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use softphone_core::{
    Account, AudioError, AudioPlatform, AudioResult, ClientBuilder, ClientConfig, ClientError,
    ClientEvent, ClientManager, ClientResult, CoreStatus, Credentials, EngineEvent, EngineEventSink,
    GainRange, KeepAliveConfig, SessionId, SipEngine, SoftphoneEventHandler, StateEvent, Tone,
};

pub const WAIT: Duration = Duration::from_secs(2);

/// Engine double: counts requests, returns scripted results and can hold
/// register requests until released
#[derive(Default)]
pub struct FakeEngine {
    pub register_results: Mutex<VecDeque<ClientResult<()>>>,
    pub hold_register: AtomicBool,
    pub release_register: Notify,
    pub invite_result: Mutex<Option<ClientError>>,
    pub register_calls: AtomicUsize,
    pub unregister_calls: AtomicUsize,
    pub invite_calls: AtomicUsize,
    pub answer_calls: AtomicUsize,
    pub hangup_calls: AtomicUsize,
    pub keep_alive_calls: AtomicUsize,
    sink: Mutex<Option<EngineEventSink>>,
}

impl FakeEngine {
    pub fn script_register(&self, result: ClientResult<()>) {
        self.register_results.lock().unwrap().push_back(result);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: EngineEvent) {
        let sink = self.sink.lock().unwrap().clone().expect("engine not attached");
        sink.push(event).await.unwrap();
    }

    pub async fn incoming(&self, id: i64, caller: &str) {
        self.emit(EngineEvent::IncomingCall { session_id: SessionId::new(id), caller: caller.to_string() })
            .await;
    }
}

#[async_trait]
impl SipEngine for FakeEngine {
    fn attach(&self, events: EngineEventSink) {
        *self.sink.lock().unwrap() = Some(events);
    }

    async fn send_register(&self, _account: &Account) -> ClientResult<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_register.load(Ordering::SeqCst) {
            self.release_register.notified().await;
        }
        self.register_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn send_unregister(&self, _account: &Account) -> ClientResult<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_invite(&self, _session_id: SessionId, _target: &str) -> ClientResult<()> {
        self.invite_calls.fetch_add(1, Ordering::SeqCst);
        match self.invite_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn send_answer(&self, _session_id: SessionId) -> ClientResult<()> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_hangup(&self, _session_id: SessionId) -> ClientResult<()> {
        self.hangup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_keep_alive(&self) -> ClientResult<()> {
        self.keep_alive_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Audio device double with a 0..=10 volume and -5..=5 gain range
#[derive(Debug, Default)]
pub struct FakeAudio {
    pub speaker_unavailable: AtomicBool,
    pub speaker: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAudio {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioPlatform for FakeAudio {
    async fn set_speaker(&self, enabled: bool) -> AudioResult<()> {
        if self.speaker_unavailable.load(Ordering::SeqCst) {
            return Err(AudioError::RouteUnavailable { route: "speaker".to_string() });
        }
        self.speaker.store(enabled, Ordering::SeqCst);
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
        GainRange::new(0, 10)
    }

    fn microphone_gain_range(&self) -> GainRange {
        GainRange::new(-5, 5)
    }

    async fn start_tone(&self, tone: Tone) -> AudioResult<()> {
        self.record(format!("start:{tone}"));
        Ok(())
    }

    async fn stop_tone(&self, tone: Tone) -> AudioResult<()> {
        self.record(format!("stop:{tone}"));
        Ok(())
    }
}

/// Observer that keeps every event in arrival order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ClientEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn registration_codes(&self) -> Vec<i32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Registration { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn state_events(&self, event_type: &str) -> Vec<StateEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::State(s) if s.event_type == event_type => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn call_states(&self) -> Vec<String> {
        self.state_events("callStateChanged")
            .iter()
            .map(|e| e.payload["state"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Log { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SoftphoneEventHandler for Recorder {
    async fn on_registration_changed(&self, code: i32, error_message: String) {
        self.events.lock().unwrap().push(ClientEvent::Registration { code, error_message });
    }

    async fn on_log(&self, message: String, info: String) {
        self.events.lock().unwrap().push(ClientEvent::Log { message, info });
    }

    async fn on_state_event(&self, event: StateEvent) {
        self.events.lock().unwrap().push(ClientEvent::State(event));
    }
}

pub struct TestPhone {
    pub client: Arc<ClientManager>,
    pub engine: Arc<FakeEngine>,
    pub audio: Arc<FakeAudio>,
    pub recorder: Arc<Recorder>,
}

pub fn agent_account() -> Account {
    Account::new(
        "sip:agent42@pbx.example.com",
        "sip:pbx.example.com:5060",
        Credentials::new("agent42", "s3cret").with_realm("pbx.example.com"),
    )
    .with_display_name("Agent 42")
    .with_profile([("tenant", "acme"), ("queue", "support")])
}

/// Keep-alive far enough out that it never fires on its own
pub fn quiet_config() -> ClientConfig {
    ClientConfig::new().with_keep_alive(KeepAliveConfig::new(60_000))
}

pub async fn login(config: ClientConfig) -> TestPhone {
    let engine = Arc::new(FakeEngine::default());
    let audio = Arc::new(FakeAudio::default());
    let recorder = Arc::new(Recorder::default());

    let client = ClientBuilder::new()
        .account(agent_account())
        .engine(engine.clone())
        .audio_platform(audio.clone())
        .event_handler(recorder.clone())
        .config(config)
        .login()
        .await
        .expect("login");

    TestPhone { client, engine, audio, recorder }
}

/// Poll the core until `check` holds, then flush events so the recorder is
/// up to date
pub async fn wait_for<F>(client: &ClientManager, what: &str, check: F) -> CoreStatus
where
    F: Fn(&CoreStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let status = client.status().await.expect("status");
        if check(&status) {
            client.flush_events().await;
            return status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}; last status: {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
