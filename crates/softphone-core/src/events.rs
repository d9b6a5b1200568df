//! Event reporting to the host application
//!
//! Every state change inside the core is pushed to the host through the
//! [`EventNotifier`]. There are three event classes:
//!
//! - **Registration events** - `(code, error_message)` where the code is the
//!   [`RegistrationState`] number (0 = Unregistered ... 3 = Failed)
//! - **Log events** - `(message, info)` diagnostics, best effort
//! - **State events** - a structured [`StateEvent`] envelope
//!   `{type, payload, timestamp}` for call, audio, network and registration
//!   transitions
//!
//! Producers only call [`EventNotifier::push`], which never blocks. A
//! dispatcher task delivers events in push order to every matching
//! [`EventSubscription`] and to the broadcast stream returned by
//! [`EventNotifier::subscribe_events`]. Each event is delivered at most once
//! per subscriber.
//!
//! # Example
//!
//! ```rust
//! use softphone_core::events::{EventNotifier, EventSubscription, SoftphoneEventHandler};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct PrintHandler;
//!
//! #[async_trait]
//! impl SoftphoneEventHandler for PrintHandler {
//!     async fn on_registration_changed(&self, code: i32, error_message: String) {
//!         println!("registration {code} {error_message}");
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let notifier = EventNotifier::new(16);
//! let id = notifier.subscribe(EventSubscription::all_events(Arc::new(PrintHandler)));
//! notifier.log("hello", "from the docs");
//! notifier.flush().await;
//! assert!(notifier.unsubscribe(id));
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::audio::PlayingTone;
use crate::call::CallTransition;
use crate::error::{ClientError, ClientResult};
use crate::registration::{RegistrationState, RegistrationTransition};

/// `type` values used in [`StateEvent`] envelopes
pub mod event_types {
    pub const REGISTRATION_STATE_CHANGED: &str = "registrationStateChanged";
    pub const CALL_STATE_CHANGED: &str = "callStateChanged";
    pub const SPEAKER_CHANGED: &str = "speakerChanged";
    pub const OUTPUT_VOLUME_CHANGED: &str = "outputVolumeChanged";
    pub const MICROPHONE_GAIN_CHANGED: &str = "microphoneGainChanged";
    pub const TONE_CHANGED: &str = "toneChanged";
    pub const NETWORK_CHANGED: &str = "networkChanged";
}

/// Generic state-change envelope
///
/// Serialises to `{"type": ..., "payload": {...}, "timestamp": ...}`. How the
/// host forwards it (method channel, websocket, JS bridge) is up to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl StateEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self { event_type: event_type.into(), payload, timestamp: Utc::now() }
    }

    pub fn registration_changed(transition: &RegistrationTransition) -> Self {
        let mut payload = json!({
            "state": transition.state,
            "code": transition.state.code(),
            "previousState": transition.previous,
        });
        if let Some(error) = &transition.error {
            payload["error"] = json!({ "code": error.code, "message": error.message });
        }
        Self::new(event_types::REGISTRATION_STATE_CHANGED, payload)
    }

    pub fn call_state_changed(transition: &CallTransition) -> Self {
        let mut payload = json!({
            "sessionId": transition.session_id,
            "direction": transition.direction,
            "state": transition.state,
            "previousState": transition.previous,
            "remote": transition.remote,
        });
        if let Some(reason) = &transition.reason {
            payload["reason"] = json!(reason);
        }
        if let Some(error) = &transition.error {
            payload["error"] = json!({ "code": error.code, "message": error.message });
        }
        Self::new(event_types::CALL_STATE_CHANGED, payload)
    }

    pub fn speaker_changed(enabled: bool) -> Self {
        Self::new(event_types::SPEAKER_CHANGED, json!({ "enabled": enabled }))
    }

    pub fn output_volume_changed(requested: i32, applied: i32) -> Self {
        Self::new(
            event_types::OUTPUT_VOLUME_CHANGED,
            json!({ "requested": requested, "level": applied }),
        )
    }

    pub fn microphone_gain_changed(requested: i32, applied: i32) -> Self {
        Self::new(
            event_types::MICROPHONE_GAIN_CHANGED,
            json!({ "requested": requested, "level": applied }),
        )
    }

    pub fn tone_changed(previous: PlayingTone, current: PlayingTone) -> Self {
        Self::new(
            event_types::TONE_CHANGED,
            json!({ "tone": current, "previousTone": previous }),
        )
    }

    pub fn network_changed(connected: bool) -> Self {
        Self::new(event_types::NETWORK_CHANGED, json!({ "connected": connected }))
    }

    pub fn to_json(&self) -> ClientResult<String> {
        serde_json::to_string(self)
            .map_err(|e| ClientError::internal_error(format!("Failed to serialize event: {e}")))
    }
}

/// Event pushed to the host
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Registration state changed
    Registration { code: i32, error_message: String },
    /// Diagnostic message
    Log { message: String, info: String },
    /// Structured state change
    State(StateEvent),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Registration { .. } => EventKind::Registration,
            ClientEvent::Log { .. } => EventKind::Log,
            ClientEvent::State(_) => EventKind::State,
        }
    }

    /// Registration state carried by a registration event
    pub fn registration_state(&self) -> Option<RegistrationState> {
        match self {
            ClientEvent::Registration { code, .. } => RegistrationState::from_code(*code),
            _ => None,
        }
    }

    /// Check whether this event passes a subscription filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(kinds) = &filter.kinds {
            if !kinds.contains(&self.kind()) {
                return false;
            }
        }
        if let (ClientEvent::State(event), Some(types)) = (self, &filter.state_types) {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        true
    }
}

/// The three event classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Registration,
    Log,
    State,
}

/// Filter options for event subscriptions
///
/// `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only deliver these event classes
    pub kinds: Option<HashSet<EventKind>>,
    /// Only deliver state events with these `type` values
    pub state_types: Option<HashSet<String>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self { kinds: Some(kinds.into_iter().collect()), state_types: None }
    }

    pub fn with_state_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_types = Some(types.into_iter().map(Into::into).collect());
        self
    }
}

/// Observer implemented by the host
///
/// Only the registration callback is required. Handlers run on the
/// notifier's dispatcher task, so a slow handler delays later events but never
/// blocks the core.
#[async_trait]
pub trait SoftphoneEventHandler: Send + Sync {
    /// Registration state changed; `code` is 0..=3, `error_message` is empty
    /// unless the state is `Failed`
    async fn on_registration_changed(&self, code: i32, error_message: String);

    /// Diagnostic message (optional - default implementation does nothing)
    async fn on_log(&self, _message: String, _info: String) {}

    /// Structured state change (optional - default implementation does nothing)
    async fn on_state_event(&self, _event: StateEvent) {}
}

/// A handler registered with the notifier, plus its filter
#[derive(Clone)]
pub struct EventSubscription {
    handler: Arc<dyn SoftphoneEventHandler>,
    filter: EventFilter,
    id: Uuid,
}

impl EventSubscription {
    pub fn new(handler: Arc<dyn SoftphoneEventHandler>, filter: EventFilter) -> Self {
        Self { handler, filter, id: Uuid::new_v4() }
    }

    pub fn all_events(handler: Arc<dyn SoftphoneEventHandler>) -> Self {
        Self::new(handler, EventFilter::all())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn should_receive(&self, event: &ClientEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    /// Deliver the event if it passes this subscription's filter
    pub async fn deliver_event(&self, event: ClientEvent) {
        if !self.should_receive(&event) {
            return;
        }
        match event {
            ClientEvent::Registration { code, error_message } => {
                self.handler.on_registration_changed(code, error_message).await
            }
            ClientEvent::Log { message, info } => self.handler.on_log(message, info).await,
            ClientEvent::State(state) => self.handler.on_state_event(state).await,
        }
    }
}

enum Dispatch {
    Event(ClientEvent),
    Flush(oneshot::Sender<()>),
}

struct Subscribers {
    subscriptions: DashMap<Uuid, EventSubscription>,
    broadcaster: broadcast::Sender<ClientEvent>,
}

impl Subscribers {
    async fn deliver(&self, event: ClientEvent) {
        // Snapshot first so no map guard is held across handler awaits
        let targets: Vec<EventSubscription> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.should_receive(&event))
            .map(|entry| entry.value().clone())
            .collect();

        futures::future::join_all(
            targets.iter().map(|subscription| subscription.deliver_event(event.clone())),
        )
        .await;

        // No stream subscribers is not an error
        let _ = self.broadcaster.send(event);
    }
}

/// Push-only event hub shared by all components of a logged-in client
pub struct EventNotifier {
    subscribers: Arc<Subscribers>,
    queue: mpsc::UnboundedSender<Dispatch>,
}

impl EventNotifier {
    /// Create the notifier and spawn its dispatcher task
    ///
    /// Must be called from within a tokio runtime. `capacity` bounds the
    /// backlog of each [`subscribe_events`](Self::subscribe_events) stream.
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity.max(1));
        let subscribers = Arc::new(Subscribers { subscriptions: DashMap::new(), broadcaster });
        let (queue, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        let dispatcher = subscribers.clone();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Dispatch::Event(event) => dispatcher.deliver(event).await,
                    Dispatch::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Event dispatcher stopped");
        });

        Self { subscribers, queue }
    }

    pub fn subscribe(&self, subscription: EventSubscription) -> Uuid {
        let id = subscription.id();
        self.subscribers.subscriptions.insert(id, subscription);
        tracing::debug!(subscription_id = %id, "Event handler subscribed");
        id
    }

    /// Remove a subscription; `false` if the id was unknown
    ///
    /// Events already queued may still reach the handler until the next
    /// [`flush`](Self::flush) completes.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.subscribers.subscriptions.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription_id = %id, "Event handler unsubscribed");
        }
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribers.subscriptions.len()
    }

    /// Stream of every event, for hosts that prefer a channel over a handler
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.subscribers.broadcaster.subscribe()
    }

    /// Queue an event for delivery. Never blocks.
    pub fn push(&self, event: ClientEvent) {
        if self.queue.send(Dispatch::Event(event)).is_err() {
            tracing::warn!("Event dispatcher is gone, dropping event");
        }
    }

    pub fn registration(&self, state: RegistrationState, error_message: impl Into<String>) {
        self.push(ClientEvent::Registration { code: state.code(), error_message: error_message.into() });
    }

    pub fn log(&self, message: impl Into<String>, info: impl Into<String>) {
        self.push(ClientEvent::Log { message: message.into(), info: info.into() });
    }

    pub fn state(&self, event: StateEvent) {
        self.push(ClientEvent::State(event));
    }

    /// Wait until every event pushed before this call has been delivered
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(Dispatch::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
