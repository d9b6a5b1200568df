//! The client handle
//!
//! [`ClientManager`] is the explicitly constructed instance a host keeps for
//! the lifetime of a login. It owns no state machine itself: registration and
//! call commands are forwarded to the account's serialized context, and audio
//! commands go straight to the [`AudioRouteController`], which serializes on
//! the audio device instead.
//!
//! Operations are grouped by concern in sibling modules:
//!
//! - `registration` - register, refresh, unregister, network changes
//! - `calls` - answer, hang up, outbound calls
//! - `controls` - speaker, volume, gain, tones, background mode

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::actor::{Command, CoreActor, CoreMessage};
use super::config::ClientConfig;
use super::types::CoreStatus;
use crate::account::{Account, UserProfile};
use crate::audio::{AudioPlatform, AudioRouteController};
use crate::engine::{EngineEventSink, SipEngine};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventNotifier, EventSubscription};

/// Handle to a logged-in softphone core
pub struct ClientManager {
    pub(crate) commands: mpsc::Sender<CoreMessage>,
    pub(crate) audio: Arc<AudioRouteController>,
    pub(crate) notifier: Arc<EventNotifier>,
    account: Arc<Account>,
    config: ClientConfig,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl ClientManager {
    /// Validate the inputs, build the components and spawn the serialized
    /// context. Used by [`ClientBuilder::login`](super::ClientBuilder::login).
    pub(crate) async fn login(
        account: Account,
        engine: Arc<dyn SipEngine>,
        platform: Arc<dyn AudioPlatform>,
        config: ClientConfig,
        subscriptions: Vec<EventSubscription>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;
        account.validate()?;

        let account = Arc::new(account);
        let notifier = Arc::new(EventNotifier::new(config.event_channel_capacity));
        for subscription in subscriptions {
            notifier.subscribe(subscription);
        }

        let audio = Arc::new(AudioRouteController::new(platform, &config.audio, notifier.clone()));
        if let Err(e) = audio.apply_preferences(&config.audio).await {
            warn!(error = %e, "Could not apply audio preferences");
            notifier.log("Could not apply audio preferences", e.to_string());
        }

        let (commands, rx) = mpsc::channel(config.command_queue_depth);
        engine.attach(EngineEventSink::new(commands.downgrade()));

        let actor = CoreActor::new(
            account.clone(),
            engine,
            audio.clone(),
            notifier.clone(),
            config.clone(),
            commands.downgrade(),
            rx,
        );
        let handle = tokio::spawn(actor.run());

        info!(aor = %account.aor, server = %account.server, "Softphone core logged in");
        notifier.log("Logged in", account.aor.clone());

        Ok(Arc::new(Self {
            commands,
            audio,
            notifier,
            account,
            config,
            actor: Mutex::new(Some(handle)),
        }))
    }

    /// Send a command and wait for the serialized context to answer
    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ClientResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(CoreMessage::Command(command(reply)))
            .await
            .map_err(|_| ClientError::CoreShutdown)?;
        response.await.map_err(|_| ClientError::CoreShutdown)
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// The profile supplied at login, unchanged
    pub fn user_profile(&self) -> UserProfile {
        self.account.profile.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of registration, call, keep-alive and audio state
    pub async fn status(&self) -> ClientResult<CoreStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Sink for engine-initiated events, for engines that are not handed one
    /// through [`SipEngine::attach`]
    pub fn engine_events(&self) -> EngineEventSink {
        EngineEventSink::new(self.commands.downgrade())
    }

    /// Add an observer. Keep the id and call [`unsubscribe`](Self::unsubscribe)
    /// before the observer goes away.
    pub fn subscribe(&self, subscription: EventSubscription) -> Uuid {
        self.notifier.subscribe(subscription)
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Stream of every event pushed from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.notifier.subscribe_events()
    }

    /// Wait until all events emitted so far have reached the observers
    pub async fn flush_events(&self) {
        self.notifier.flush().await
    }

    /// End any call, unregister, stop keep-alive and tones, then stop the
    /// serialized context
    ///
    /// Every later command fails with [`ClientError::CoreShutdown`]. A second
    /// logout is a no-op.
    pub async fn logout(&self) -> ClientResult<()> {
        let mut actor = self.actor.lock().await;
        let Some(handle) = actor.take() else {
            return Ok(());
        };

        let result = self.request(|reply| Command::Logout { reply }).await;
        if let Err(e) = handle.await {
            warn!(error = %e, "Core actor ended abnormally");
        }
        self.notifier.flush().await;

        match result {
            Ok(inner) => inner,
            // The context was already gone; nothing left to tear down
            Err(ClientError::CoreShutdown) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("aor", &self.account.aor)
            .field("server", &self.account.server)
            .finish_non_exhaustive()
    }
}
