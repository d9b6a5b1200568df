//! Serialized execution context of a logged-in account
//!
//! One tokio task owns the registration controller, the call session
//! controller and the keep-alive scheduler. Host commands, engine events and
//! the results of engine requests all arrive on the same bounded channel and
//! are handled one at a time in arrival order, so no two transitions can
//! interleave.
//!
//! Engine requests never run on this task. Each one is spawned on a worker
//! wrapped in a deadline, and its result comes back as a message tagged with
//! the registration generation or the call's session id. Results whose tag no
//! longer matches are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::recovery::with_timeout;
use super::types::CoreStatus;
use crate::account::Account;
use crate::audio::AudioRouteController;
use crate::call::{
    AnswerOutcome, CallHandle, CallSessionController, CallState, CallTransition, HangupOutcome,
    SessionId,
};
use crate::engine::{EngineEvent, SipEngine};
use crate::error::{ClientError, ClientResult};
use crate::events::{EventNotifier, StateEvent};
use crate::keepalive::KeepAliveScheduler;
use crate::registration::{
    Completion, LastError, RegistrationController, RegistrationState, RegistrationTransition,
    RequestKind, UnregisterDecision, UnregisterOutcome,
};

type Reply<T> = oneshot::Sender<ClientResult<T>>;

/// Host commands
pub(crate) enum Command {
    Register { reply: Reply<RegistrationState> },
    RefreshRegister { reply: Reply<bool> },
    Unregister { reply: Reply<UnregisterOutcome> },
    AnswerCall { session_id: SessionId, reply: Reply<AnswerOutcome> },
    MakeCall { target: String, reply: Reply<SessionId> },
    HangUp { reply: Reply<HangupOutcome> },
    SetBackground { background: bool, reply: Reply<()> },
    NetworkChanged { connected: bool, reply: Reply<()> },
    Status { reply: oneshot::Sender<CoreStatus> },
    Logout { reply: Reply<()> },
}

/// Everything the actor consumes
pub(crate) enum CoreMessage {
    Command(Command),
    Engine(EngineEvent),
    RegisterResult { generation: u64, kind: RequestKind, result: ClientResult<()> },
    UnregisterResult { result: ClientResult<()> },
    AnswerResult { call: CallHandle, result: ClientResult<()> },
    InviteResult { call: CallHandle, result: ClientResult<()> },
    HangupResult { call: CallHandle, result: ClientResult<()> },
    KeepAliveResult { generation: u64, result: ClientResult<()> },
}

pub(crate) struct CoreActor {
    account: Arc<Account>,
    engine: Arc<dyn SipEngine>,
    audio: Arc<AudioRouteController>,
    notifier: Arc<EventNotifier>,
    config: ClientConfig,
    registration: RegistrationController,
    calls: CallSessionController,
    keep_alive: KeepAliveScheduler,
    // Weak so that dropping every client handle ends the loop
    tx: mpsc::WeakSender<CoreMessage>,
    rx: mpsc::Receiver<CoreMessage>,
}

impl CoreActor {
    pub(crate) fn new(
        account: Arc<Account>,
        engine: Arc<dyn SipEngine>,
        audio: Arc<AudioRouteController>,
        notifier: Arc<EventNotifier>,
        config: ClientConfig,
        tx: mpsc::WeakSender<CoreMessage>,
        rx: mpsc::Receiver<CoreMessage>,
    ) -> Self {
        let keep_alive = KeepAliveScheduler::new(config.keep_alive.clone());
        Self {
            account,
            engine,
            audio,
            notifier,
            config,
            registration: RegistrationController::new(),
            calls: CallSessionController::new(),
            keep_alive,
            tx,
            rx,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(aor = %self.account.aor, "Core actor started");

        while let Some(message) = self.rx.recv().await {
            match message {
                CoreMessage::Command(Command::Logout { reply }) => {
                    let result = self.logout().await;
                    let _ = reply.send(result);
                    break;
                }
                CoreMessage::Command(command) => self.handle_command(command).await,
                CoreMessage::Engine(event) => self.handle_engine_event(event).await,
                CoreMessage::RegisterResult { generation, kind, result } => {
                    self.on_register_result(generation, kind, result)
                }
                CoreMessage::UnregisterResult { result } => {
                    if let Err(e) = result {
                        warn!(error = %e, "Unregister request failed");
                        self.notifier.log("Unregister request failed", e.to_string());
                    }
                }
                CoreMessage::AnswerResult { call, result } => {
                    self.on_call_request_result("answer_call", call, result).await
                }
                CoreMessage::InviteResult { call, result } => {
                    self.on_call_request_result("make_call", call, result).await
                }
                CoreMessage::HangupResult { call, result } => self.on_hangup_result(call, result).await,
                CoreMessage::KeepAliveResult { generation, result } => {
                    self.on_keep_alive_result(generation, result)
                }
            }
        }

        self.keep_alive.stop();
        debug!(aor = %self.account.aor, "Core actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register { reply } => {
                let _ = reply.send(Ok(self.register()));
            }
            Command::RefreshRegister { reply } => {
                let _ = reply.send(Ok(self.refresh_register()));
            }
            Command::Unregister { reply } => {
                let _ = reply.send(Ok(self.unregister()));
            }
            Command::AnswerCall { session_id, reply } => {
                let result = self.answer_call(session_id).await;
                let _ = reply.send(result);
            }
            Command::MakeCall { target, reply } => {
                let result = self.make_call(target).await;
                let _ = reply.send(result);
            }
            Command::HangUp { reply } => {
                let result = self.hang_up().await;
                let _ = reply.send(Ok(result));
            }
            Command::SetBackground { background, reply } => {
                self.keep_alive.set_background(background);
                info!(background, interval_ms = self.keep_alive.status().interval_ms, "Keep-alive cadence updated");
                let _ = reply.send(Ok(()));
            }
            Command::NetworkChanged { connected, reply } => {
                self.network_changed(connected);
                let _ = reply.send(Ok(()));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
            // Handled in run() because it ends the loop
            Command::Logout { reply } => {
                let _ = reply.send(Err(ClientError::internal_error("logout routed to command handler")));
            }
        }
    }

    // ---- registration ------------------------------------------------------

    fn register(&mut self) -> RegistrationState {
        match self.registration.begin_register() {
            Some(transition) => {
                self.publish_registration(&transition);
                self.dispatch_register(RequestKind::Register);
            }
            None => debug!(state = %self.registration.state(), "Register ignored"),
        }
        self.registration.state()
    }

    fn refresh_register(&mut self) -> bool {
        if self.registration.begin_refresh().is_none() {
            debug!(
                state = %self.registration.state(),
                in_flight = self.registration.refresh_in_flight(),
                "Refresh ignored"
            );
            return false;
        }
        self.dispatch_register(RequestKind::Refresh);
        true
    }

    fn dispatch_register(&self, kind: RequestKind) {
        let generation = self.registration.generation();
        let engine = self.engine.clone();
        let account = self.account.clone();
        debug!(generation, %kind, "Dispatching registration request");

        self.dispatch(
            match kind {
                RequestKind::Register => "register",
                RequestKind::Refresh => "refresh_register",
            },
            self.config.register_timeout(),
            async move { engine.send_register(&account).await },
            move |result| CoreMessage::RegisterResult { generation, kind, result },
        );
    }

    fn on_register_result(&mut self, generation: u64, kind: RequestKind, result: ClientResult<()>) {
        match self.registration.complete(generation, kind, result) {
            Completion::Stale => {
                debug!(generation, current = self.registration.generation(), %kind, "Ignoring stale registration result")
            }
            Completion::Unchanged => debug!(generation, "Registration refreshed"),
            Completion::Transition(transition) => self.publish_registration(&transition),
        }
    }

    fn unregister(&mut self) -> UnregisterOutcome {
        let decision = self.registration.request_unregister(self.calls.has_live_session());
        let outcome = UnregisterOutcome::from(&decision);

        if decision == UnregisterDecision::Deferred {
            let session_id = self.calls.active_session_id();
            info!(%session_id, "Unregister deferred until the call ends");
            self.notifier.log("Unregister deferred until the call ends", session_id.to_string());
        }
        self.apply_unregister(decision);
        outcome
    }

    fn apply_unregister(&mut self, decision: UnregisterDecision) {
        let UnregisterDecision::Immediate { transition, notify_engine } = decision else {
            return;
        };
        self.publish_registration(&transition);

        if notify_engine {
            let engine = self.engine.clone();
            let account = self.account.clone();
            self.dispatch(
                "unregister",
                self.config.engine_timeout(),
                async move { engine.send_unregister(&account).await },
                |result| CoreMessage::UnregisterResult { result },
            );
        }
    }

    fn publish_registration(&mut self, transition: &RegistrationTransition) {
        match &transition.error {
            Some(error) => warn!(
                from = %transition.previous,
                to = %transition.state,
                code = error.code,
                message = %error.message,
                "Registration state changed"
            ),
            None => info!(from = %transition.previous, to = %transition.state, "Registration state changed"),
        }

        self.notifier.registration(transition.state, transition.error_message());
        self.notifier.state(StateEvent::registration_changed(transition));
        self.sync_keep_alive();
    }

    // ---- keep-alive --------------------------------------------------------

    fn sync_keep_alive(&mut self) {
        if !self.registration.keep_alive_enabled() {
            self.keep_alive.stop();
            return;
        }
        if self.keep_alive.is_running() {
            return;
        }

        let engine = self.engine.clone();
        let tx = self.tx.clone();
        let timeout = self.config.engine_timeout();
        self.keep_alive.start(move |generation| {
            let engine = engine.clone();
            let tx = tx.clone();
            async move {
                let result = with_timeout("keep_alive", timeout, engine.send_keep_alive()).await;
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(CoreMessage::KeepAliveResult { generation, result }).await;
                }
            }
        });
    }

    fn on_keep_alive_result(&mut self, generation: u64, result: ClientResult<()>) {
        if !self.keep_alive.record_result(generation, &result) {
            debug!(generation, "Ignoring keep-alive result from a stopped timer");
            return;
        }
        if let Err(e) = result {
            self.notifier.log("Keep-alive failed", format!("code={} {}", e.status_code(), e));
        }
    }

    fn network_changed(&mut self, connected: bool) {
        info!(connected, "Network reachability changed");
        self.notifier.state(StateEvent::network_changed(connected));
        self.notifier.log(
            if connected { "Network available" } else { "Network unavailable" },
            self.registration.state().to_string(),
        );

        if connected
            && self.config.refresh_on_network_restore
            && self.registration.state() == RegistrationState::Registered
        {
            self.refresh_register();
        }
    }

    // ---- calls -------------------------------------------------------------

    async fn answer_call(&mut self, requested: SessionId) -> ClientResult<AnswerOutcome> {
        let (outcome, transition) = self.calls.answer(requested)?;
        match transition {
            Some(transition) => {
                let session_id = transition.session_id;
                let call = self.call_handle(session_id);
                self.publish_call(&transition).await;

                let engine = self.engine.clone();
                self.dispatch(
                    "answer_call",
                    self.config.engine_timeout(),
                    async move { engine.send_answer(session_id).await },
                    move |result| CoreMessage::AnswerResult { call, result },
                );
            }
            None => debug!(%requested, ?outcome, "Answer not applied"),
        }
        Ok(outcome)
    }

    async fn make_call(&mut self, target: String) -> ClientResult<SessionId> {
        if self.registration.state() != RegistrationState::Registered {
            return Err(ClientError::NotRegistered);
        }
        let transition = self.calls.begin_outbound(target.clone())?;
        let session_id = transition.session_id;
        let call = self.call_handle(session_id);
        self.publish_call(&transition).await;

        let engine = self.engine.clone();
        self.dispatch(
            "make_call",
            self.config.engine_timeout(),
            async move { engine.send_invite(session_id, &target).await },
            move |result| CoreMessage::InviteResult { call, result },
        );
        Ok(session_id)
    }

    async fn hang_up(&mut self) -> HangupOutcome {
        let (outcome, transition) = self.calls.begin_hangup();
        if let Some(transition) = transition {
            let call = self.call_handle(transition.session_id);
            self.publish_call(&transition).await;
            self.dispatch_hangup(call);
        } else {
            debug!(?outcome, "Hang-up already in progress or no session");
        }
        outcome
    }

    fn dispatch_hangup(&self, call: CallHandle) {
        let engine = self.engine.clone();
        let session_id = call.session_id;
        self.dispatch(
            "hang_up",
            self.config.engine_timeout(),
            async move { engine.send_hangup(session_id).await },
            move |result| CoreMessage::HangupResult { call, result },
        );
    }

    /// Tag for requests about `session_id`; detached unless it is the live call
    fn call_handle(&self, session_id: SessionId) -> CallHandle {
        self.calls
            .handle()
            .filter(|call| call.session_id == session_id)
            .unwrap_or_else(|| CallHandle::detached(session_id))
    }

    async fn on_call_request_result(&mut self, operation: &str, call: CallHandle, result: ClientResult<()>) {
        let session_id = call.session_id;
        let Err(error) = result else {
            debug!(%session_id, operation, "Engine accepted call request");
            return;
        };

        let transitions = self.calls.fail(call, &error);
        if transitions.is_empty() {
            debug!(%session_id, operation, error = %error, "Ignoring failure for a stale session");
            return;
        }
        warn!(%session_id, operation, error = %error, "Call request failed");
        self.publish_call_end(transitions).await;
    }

    async fn on_hangup_result(&mut self, call: CallHandle, result: ClientResult<()>) {
        let session_id = call.session_id;
        let transitions = match result {
            Ok(()) => self.calls.finish_request(call, Some("local hangup".to_string())).into_iter().collect(),
            Err(error) => {
                warn!(%session_id, error = %error, "Hang-up request failed");
                self.calls.fail(call, &error)
            }
        };
        if transitions.is_empty() {
            debug!(%session_id, "Ignoring hang-up result for a stale session");
            return;
        }
        self.publish_call_end(transitions).await;
    }

    /// Publish the closing transitions of a call, then run any deferred
    /// unregister so the two terminal events go out in that order
    async fn publish_call_end(&mut self, transitions: Vec<CallTransition>) {
        for transition in &transitions {
            self.publish_call(transition).await;
        }
        if let Some(decision) = self.registration.on_call_ended() {
            info!("Running deferred unregister");
            self.apply_unregister(decision);
        }
    }

    async fn publish_call(&self, transition: &CallTransition) {
        match &transition.error {
            Some(error) => warn!(
                session_id = %transition.session_id,
                from = %transition.previous,
                to = %transition.state,
                code = error.code,
                "Call state changed"
            ),
            None => info!(
                session_id = %transition.session_id,
                from = %transition.previous,
                to = %transition.state,
                "Call state changed"
            ),
        }
        self.notifier.state(StateEvent::call_state_changed(transition));

        // Audio side effects; failures here never change call state
        let audio = match transition.state {
            CallState::Ringing => self.audio.play_ring_tone().await,
            CallState::Active => {
                let stopped = self.audio.stop_tones().await;
                if self.config.audio.speaker_on_answer {
                    stopped.and(self.audio.set_speaker_enabled(true).await)
                } else {
                    stopped
                }
            }
            CallState::Ending | CallState::Ended => self.audio.stop_tones().await,
            CallState::Idle | CallState::Answering => Ok(()),
        };
        if let Err(e) = audio {
            warn!(session_id = %transition.session_id, error = %e, "Audio update for call transition failed");
        }
    }

    // ---- engine events -----------------------------------------------------

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::IncomingCall { session_id, caller } => self.on_incoming_call(session_id, caller).await,
            EngineEvent::RemoteRinging { session_id } => {
                if self.calls.is_current(session_id) && self.calls.state() == CallState::Answering {
                    if let Err(e) = self.audio.play_ring_back_tone().await {
                        warn!(%session_id, error = %e, "Could not start ring-back tone");
                    }
                } else {
                    debug!(%session_id, "Ignoring ringing notification for a stale session");
                }
            }
            EngineEvent::CallConnected { session_id } => match self.calls.connected(session_id) {
                Some(transition) => self.publish_call(&transition).await,
                None => debug!(%session_id, "Ignoring connect for a stale session"),
            },
            EngineEvent::CallTerminated { session_id, reason } => {
                match self.calls.finish(session_id, reason) {
                    Some(transition) => self.publish_call_end(vec![transition]).await,
                    None => debug!(%session_id, "Ignoring termination of a stale session"),
                }
            }
            EngineEvent::RegistrationLost { code, message } => {
                match self.registration.registration_lost(LastError { code, message }) {
                    Some(transition) => self.publish_registration(&transition),
                    None => debug!(state = %self.registration.state(), "Ignoring registration loss"),
                }
            }
        }
    }

    async fn on_incoming_call(&mut self, session_id: SessionId, caller: String) {
        match self.calls.incoming(session_id, caller.clone()) {
            Ok(transition) => {
                self.publish_call(&transition).await;
                if self.config.auto_answer {
                    info!(%session_id, "Auto-answering incoming call");
                    if let Err(e) = self.answer_call(session_id).await {
                        warn!(%session_id, error = %e, "Auto-answer failed");
                    }
                }
            }
            Err(ClientError::CallInProgress { session_id: live }) => {
                warn!(%session_id, %live, caller = %caller, "Declining incoming call while another is live");
                self.notifier.log("Declined incoming call while busy", format!("{session_id} {caller}"));
                self.dispatch_hangup(CallHandle::detached(session_id));
            }
            Err(e) => warn!(%session_id, error = %e, "Rejected incoming call notification"),
        }
    }

    // ---- status / logout ---------------------------------------------------

    async fn status(&self) -> CoreStatus {
        CoreStatus {
            registration: self.registration.state(),
            last_error: self.registration.last_error().cloned(),
            session: self.calls.session().cloned(),
            active_session_id: self.calls.active_session_id(),
            unregister_when_call_ends: self.registration.unregister_when_call_ends(),
            keep_alive: self.keep_alive.status(),
            audio: self.audio.route().await,
        }
    }

    async fn logout(&mut self) -> ClientResult<()> {
        info!(aor = %self.account.aor, "Logging out");
        let timeout = self.config.engine_timeout();

        let mut ending_call = None;
        if let (HangupOutcome::Ending(session_id), transition) = self.calls.begin_hangup() {
            if let Some(transition) = transition {
                self.publish_call(&transition).await;
            }
            ending_call = Some(session_id);
        }
        let unregister = self.registration.request_unregister(false);

        // Both requests run on workers; the context only waits for them
        let hangup_request = ending_call.map(|session_id| {
            let engine = self.engine.clone();
            spawn_request("hang_up", timeout, async move { engine.send_hangup(session_id).await })
        });
        let unregister_request = match &unregister {
            UnregisterDecision::Immediate { notify_engine: true, .. } => {
                let engine = self.engine.clone();
                let account = self.account.clone();
                Some(spawn_request("unregister", timeout, async move { engine.send_unregister(&account).await }))
            }
            _ => None,
        };
        let (hangup_result, unregister_result) =
            futures::future::join(join_request(hangup_request), join_request(unregister_request)).await;

        if let Some(session_id) = ending_call {
            if let Some(Err(e)) = hangup_result {
                warn!(%session_id, error = %e, "Hang-up during logout failed");
            }
            if let Some(transition) = self.calls.finish(session_id, Some("logout".to_string())) {
                self.publish_call(&transition).await;
            }
        }
        if let UnregisterDecision::Immediate { transition, .. } = unregister {
            self.publish_registration(&transition);
        }
        if let Some(Err(e)) = unregister_result {
            warn!(error = %e, "Unregister during logout failed");
        }

        self.keep_alive.stop();
        if let Err(e) = self.audio.stop_tones().await {
            warn!(error = %e, "Could not stop tones during logout");
        }
        self.notifier.log("Logged out", self.account.aor.clone());
        Ok(())
    }

    // ---- workers -----------------------------------------------------------

    /// Run an engine request on a worker and post its result back
    fn dispatch<Fut, Tag>(&self, operation: &'static str, timeout: Duration, request: Fut, tag: Tag)
    where
        Fut: Future<Output = ClientResult<()>> + Send + 'static,
        Tag: FnOnce(ClientResult<()>) -> CoreMessage + Send + 'static,
    {
        let Some(tx) = self.tx.upgrade() else {
            debug!(operation, "Client handles dropped, not dispatching");
            return;
        };
        let request = spawn_request(operation, timeout, request);
        tokio::spawn(async move {
            let result = join_request(Some(request)).await.unwrap_or_else(|| {
                Err(ClientError::internal_error(format!("{operation} produced no result")))
            });
            if tx.send(tag(result)).await.is_err() {
                debug!(operation, "Core stopped before the result was delivered");
            }
        });
    }
}

/// Run an engine request on its own worker under a deadline
fn spawn_request<Fut>(operation: &'static str, timeout: Duration, request: Fut) -> JoinHandle<ClientResult<()>>
where
    Fut: Future<Output = ClientResult<()>> + Send + 'static,
{
    tokio::spawn(with_timeout(operation, timeout, request))
}

/// Wait for an optional worker; a panicked worker counts as an internal error
async fn join_request(request: Option<JoinHandle<ClientResult<()>>>) -> Option<ClientResult<()>> {
    let request = request?;
    Some(match request.await {
        Ok(result) => result,
        Err(e) => Err(ClientError::internal_error(format!("engine request task failed: {e}"))),
    })
}
