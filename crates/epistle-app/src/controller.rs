//! Async coordinator for one active conversation.
//!
//! Owns every piece of I/O the [`Conversation`] machine asks for: the
//! single forward poll loop, the metadata refresh, page requests, decode
//! fan-out and the serialized sender. All state mutation happens on the
//! coordinator task; background work reports back through an internal
//! channel and is applied in arrival order.
//!
//! ```text
//!  ControllerHandle ──commands──▶ coordinator ──actions──▶ fetcher / tasks
//!        ▲                          │    ▲                      │
//!        └── watch / broadcast ◀────┘    └──── internal ◀───────┘
//! ```
//!
//! Shutdown cancels one scope token; every spawned task selects on it, so
//! nothing outlives the coordinator.

use std::{future::Future, sync::Arc};

use epistle_client::{Cadence, FetchHandle, MessageFetcher};
use epistle_core::{
    AuthTokenSource, ConvoAccess, ConvoId, ConvoMetadata, ConvoService, DecodedMessage,
    Environment, LastSeenStore, Message, MessageCodec, MessageId, MessageSender, PasswordStore,
    ServiceError,
};
use epistle_proto::Payload;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot, watch},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    ControllerConfig, ControllerError, ConversationView, ConvoAction, ConvoEvent,
    ConvoNotification, Conversation, Platform, decide_alert,
};

/// Buffered notifications per subscriber before the oldest are dropped.
const NOTIFICATION_CAPACITY: usize = 64;

/// Collaborators injected into a controller.
#[derive(Clone)]
pub struct ControllerDeps {
    /// Remote conversation store.
    pub service: Arc<dyn ConvoService>,
    /// Outbound delivery.
    pub sender: Arc<dyn MessageSender>,
    /// Password-hash lookup.
    pub passwords: Arc<dyn PasswordStore>,
    /// Last-seen persistence.
    pub last_seen: Arc<dyn LastSeenStore>,
    /// Per-request auth token.
    pub auth: Arc<dyn AuthTokenSource>,
    /// Decoder bound to the local user.
    pub codec: MessageCodec,
    /// Device services.
    pub platform: Arc<dyn Platform>,
}

impl std::fmt::Debug for ControllerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDeps")
            .field("user_id", &self.codec.local_user_id())
            .finish_non_exhaustive()
    }
}

enum Command {
    Open,
    Close,
    LoadOlder,
    Send(String),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Backlog,
    Forward,
    Older,
}

enum Internal {
    Page { kind: BatchKind, result: Result<Vec<Message>, ServiceError> },
    Polled(Vec<Message>),
    Decoded { kind: BatchKind, messages: Vec<DecodedMessage> },
    Metadata(Option<ConvoMetadata>),
    LoadingTimeout,
    SendFinished(Result<(), ServiceError>),
}

enum PollState {
    Idle,
    Polling { cadence: Cadence, handle: FetchHandle },
}

impl PollState {
    fn cadence(&self) -> Option<Cadence> {
        match self {
            Self::Idle => None,
            Self::Polling { cadence, .. } => Some(*cadence),
        }
    }
}

enum RefreshState {
    Idle,
    Running { token: CancellationToken, task: JoinHandle<()> },
}

/// Credentials for one conversation. A fresh token is taken per request.
struct AccessSource {
    convo_id: ConvoId,
    password_hash: String,
    user_id: String,
    auth: Arc<dyn AuthTokenSource>,
}

impl AccessSource {
    fn access(&self) -> ConvoAccess {
        ConvoAccess {
            convo_id: self.convo_id.clone(),
            password_hash: self.password_hash.clone(),
            user_id: self.user_id.clone(),
            auth_token: self.auth.current_token(),
        }
    }
}

/// Coordinator for one active conversation.
///
/// Created with [`ActiveConversationController::spawn`], which moves it onto
/// its own task and returns a [`ControllerHandle`].
pub struct ActiveConversationController<E: Environment> {
    convo: Conversation,
    config: ControllerConfig,
    access: Arc<AccessSource>,
    service: Arc<dyn ConvoService>,
    last_seen: Arc<dyn LastSeenStore>,
    codec: MessageCodec,
    platform: Arc<dyn Platform>,
    fetcher: MessageFetcher<E>,
    env: E,
    poll: PollState,
    metadata: RefreshState,
    /// Highest raw id received, including messages that failed to decode.
    raw_cursor: MessageId,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    send_tx: mpsc::UnboundedSender<String>,
    view_tx: watch::Sender<ConversationView>,
    events_tx: broadcast::Sender<ConvoNotification>,
    tasks: JoinSet<()>,
    scope: CancellationToken,
}

impl<E: Environment> ActiveConversationController<E> {
    /// Start a controller for `convo_id` on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `config` fails validation or an id is empty
    /// - `MissingPassword` if no password hash is stored for `convo_id`
    pub fn spawn(
        convo_id: impl Into<ConvoId>,
        deps: ControllerDeps,
        env: E,
        config: ControllerConfig,
    ) -> Result<ControllerHandle, ControllerError> {
        config.validate()?;

        let convo_id = convo_id.into();
        if convo_id.trim().is_empty() {
            return Err(ControllerError::InvalidConfig { reason: "convo id is empty".into() });
        }
        let user_id = deps.codec.local_user_id().to_string();
        if user_id.trim().is_empty() {
            return Err(ControllerError::InvalidConfig { reason: "user id is empty".into() });
        }
        let password_hash = deps
            .passwords
            .password_hash(&convo_id)
            .ok_or_else(|| ControllerError::MissingPassword { convo_id: convo_id.clone() })?;

        let access = Arc::new(AccessSource {
            convo_id: convo_id.clone(),
            password_hash,
            user_id,
            auth: Arc::clone(&deps.auth),
        });

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ConversationView::empty(convo_id.clone()));
        let (events_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let mut controller = Self {
            convo: Conversation::new(convo_id.clone(), &config),
            config,
            access: Arc::clone(&access),
            service: Arc::clone(&deps.service),
            last_seen: deps.last_seen,
            codec: deps.codec,
            platform: deps.platform,
            fetcher: MessageFetcher::new(deps.service, env.clone()),
            env,
            poll: PollState::Idle,
            metadata: RefreshState::Idle,
            raw_cursor: 0,
            commands,
            internal_tx: internal_tx.clone(),
            internal_rx,
            send_tx,
            view_tx,
            events_tx: events_tx.clone(),
            tasks: JoinSet::new(),
            scope: CancellationToken::new(),
        };

        let scope = controller.scope.clone();
        controller.spawn_scoped(run_sender(deps.sender, access, send_rx, internal_tx, scope));

        tracing::info!(convo_id = %convo_id, "conversation controller started");
        let task = tokio::spawn(controller.run());

        Ok(ControllerHandle {
            convo_id,
            commands: commands_tx,
            view: view_rx,
            events: events_tx,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    },
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped
                    None => {
                        self.shutdown().await;
                        break;
                    },
                },

                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        tracing::error!(convo_id = %self.access.convo_id, "controller task panicked");
                    }
                },
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open => {
                let last_seen = self.last_seen.last_seen(&self.access.convo_id);
                tracing::debug!(convo_id = %self.access.convo_id, ?last_seen, "conversation opened");
                self.apply(ConvoEvent::Opened { last_seen }).await;
            },
            Command::Close => {
                tracing::debug!(convo_id = %self.access.convo_id, "conversation closed");
                self.apply(ConvoEvent::Closed).await;
            },
            Command::LoadOlder => self.apply(ConvoEvent::LoadOlderRequested).await,
            Command::Send(payload) => {
                if self.send_tx.send(payload).is_err() {
                    let _ = self.events_tx.send(ConvoNotification::SendFailed {
                        convo_id: self.access.convo_id.clone(),
                        reason: "sender stopped".into(),
                    });
                }
            },
            // Handled by the run loop
            Command::Shutdown(_) => {},
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Page { kind, result: Ok(messages) } => {
                self.raise_raw_cursor(&messages);
                self.spawn_decode(kind, messages);
            },
            Internal::Page { kind, result: Err(e) } => {
                tracing::warn!(
                    convo_id = %self.access.convo_id,
                    error = %e,
                    ?kind,
                    "page request failed"
                );
                let event = match kind {
                    BatchKind::Older => ConvoEvent::OlderFailed,
                    BatchKind::Backlog | BatchKind::Forward => ConvoEvent::BacklogFailed,
                };
                self.apply(event).await;
            },
            Internal::Polled(messages) => {
                self.raise_raw_cursor(&messages);
                self.spawn_decode(BatchKind::Forward, messages);
            },
            Internal::Decoded { kind, messages } => {
                let event = match kind {
                    BatchKind::Backlog => ConvoEvent::BacklogLoaded(messages),
                    BatchKind::Forward => ConvoEvent::Fetched(messages),
                    BatchKind::Older => ConvoEvent::OlderLoaded(messages),
                };
                self.apply(event).await;
            },
            Internal::Metadata(metadata) => self.apply(ConvoEvent::MetadataFetched(metadata)).await,
            Internal::LoadingTimeout => self.apply(ConvoEvent::LoadingTimeout).await,
            Internal::SendFinished(result) => {
                let convo_id = self.access.convo_id.clone();
                let notification = match result {
                    Ok(()) => ConvoNotification::SendCompleted { convo_id },
                    Err(e) => {
                        tracing::warn!(convo_id = %convo_id, error = %e, "send failed");
                        ConvoNotification::SendFailed { convo_id, reason: e.to_string() }
                    },
                };
                let _ = self.events_tx.send(notification);
            },
        }
    }

    async fn apply(&mut self, event: ConvoEvent) {
        for action in self.convo.handle(event) {
            self.execute(action).await;
        }
    }

    async fn execute(&mut self, action: ConvoAction) {
        match action {
            ConvoAction::FetchBacklog { count } => self.spawn_page(BatchKind::Backlog, None, count),
            ConvoAction::FetchOlder { before_id, count } => {
                self.spawn_page(BatchKind::Older, Some(before_id), count);
            },
            ConvoAction::StartPolling { cadence, from } => self.start_polling(cadence, from).await,
            ConvoAction::StopPolling => self.stop_polling().await,
            ConvoAction::StartMetadataRefresh => self.start_metadata_refresh(),
            ConvoAction::StopMetadataRefresh => self.stop_metadata_refresh().await,
            ConvoAction::ScheduleLoadingTimeout => {
                let env = self.env.clone();
                let timeout = self.config.loading_timeout;
                let tx = self.internal_tx.clone();
                self.spawn_scoped(async move {
                    env.sleep(timeout).await;
                    let _ = tx.send(Internal::LoadingTimeout);
                });
            },
            ConvoAction::PersistLastSeen { id } => {
                if let Err(e) = self.last_seen.persist_last_seen(&self.access.convo_id, id) {
                    tracing::warn!(
                        convo_id = %self.access.convo_id,
                        id,
                        error = %e,
                        "failed to persist last seen id"
                    );
                }
            },
            ConvoAction::Alert { count } => self.alert(count),
            ConvoAction::Notify(notification) => {
                // No subscribers is fine
                let _ = self.events_tx.send(notification);
            },
            ConvoAction::Publish => self.publish(),
        }
    }

    fn raise_raw_cursor(&mut self, messages: &[Message]) {
        if let Some(max) = messages.iter().map(|m| m.id).max() {
            self.raw_cursor = self.raw_cursor.max(max);
        }
    }

    fn spawn_scoped<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scope = self.scope.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                () = scope.cancelled() => {},
                () = task => {},
            }
        });
    }

    fn spawn_page(&mut self, kind: BatchKind, before_id: Option<MessageId>, count: usize) {
        let service = Arc::clone(&self.service);
        let access = Arc::clone(&self.access);
        let tx = self.internal_tx.clone();
        self.spawn_scoped(async move {
            let access = access.access();
            let result = match before_id {
                None => service.fetch_last_messages(&access, count).await,
                Some(before_id) => service.fetch_previous_messages(&access, before_id, count).await,
            };
            let _ = tx.send(Internal::Page { kind, result });
        });
    }

    fn spawn_decode(&mut self, kind: BatchKind, raw: Vec<Message>) {
        let codec = self.codec.clone();
        let tx = self.internal_tx.clone();
        self.spawn_scoped(async move {
            let messages = decode_batch(&codec, raw).await;
            let _ = tx.send(Internal::Decoded { kind, messages });
        });
    }

    async fn start_polling(&mut self, cadence: Cadence, from: MessageId) {
        let interval = self.config.fetcher().interval(cadence);
        let tx = self.internal_tx.clone();
        let callback = move |batch: Vec<Message>| {
            let _ = tx.send(Internal::Polled(batch));
        };

        let handle = match std::mem::replace(&mut self.poll, PollState::Idle) {
            PollState::Polling { handle, .. } => {
                self.fetcher.retarget(handle, interval, callback).await
            },
            PollState::Idle => self.fetcher.start_auto_fetching(
                self.access.convo_id.clone(),
                self.access.password_hash.clone(),
                from.max(self.raw_cursor),
                interval,
                callback,
            ),
        };

        tracing::debug!(
            convo_id = %self.access.convo_id,
            %cadence,
            cursor = handle.cursor(),
            "polling"
        );
        self.poll = PollState::Polling { cadence, handle };
    }

    async fn stop_polling(&mut self) {
        if let PollState::Polling { handle, .. } = std::mem::replace(&mut self.poll, PollState::Idle)
        {
            let cursor = handle.cancel_and_wait().await;
            tracing::debug!(convo_id = %self.access.convo_id, cursor, "polling stopped");
        }
    }

    fn start_metadata_refresh(&mut self) {
        if matches!(self.metadata, RefreshState::Running { .. }) {
            return;
        }
        let token = self.scope.child_token();
        let task = tokio::spawn(run_metadata_refresh(
            Arc::clone(&self.service),
            Arc::clone(&self.access),
            self.config.metadata_refresh,
            self.internal_tx.clone(),
            token.clone(),
        ));
        self.metadata = RefreshState::Running { token, task };
    }

    async fn stop_metadata_refresh(&mut self) {
        if let RefreshState::Running { token, task } =
            std::mem::replace(&mut self.metadata, RefreshState::Idle)
        {
            token.cancel();
            if let Err(e) = task.await
                && e.is_panic()
            {
                tracing::error!(convo_id = %self.access.convo_id, "metadata refresh panicked");
            }
        }
    }

    fn alert(&self, count: usize) {
        let decision = decide_alert(
            self.platform.settings(),
            self.platform.is_app_sleeping(),
            self.platform.is_silenced(),
        );
        if decision.vibrate {
            self.platform.vibrate(self.config.vibration);
        }
        if decision.notify {
            let convo_id = self.access.convo_id.as_str();
            let title = self.convo.metadata().map_or(convo_id, |m| m.name.as_str());
            self.platform.notify(convo_id, title, count);
        }
    }

    fn publish(&self) {
        let session = self.convo.session();
        self.view_tx.send_replace(ConversationView {
            convo_id: self.access.convo_id.clone(),
            state: self.convo.state(),
            messages: session.messages().to_vec(),
            tail_id: session.tail_id(),
            loading: session.is_loading(),
            has_unseen: session.has_unseen(),
            metadata: self.convo.metadata().cloned(),
            polling: self.poll.cadence(),
        });
    }

    async fn shutdown(&mut self) {
        self.apply(ConvoEvent::Shutdown).await;
        self.scope.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::error!(convo_id = %self.access.convo_id, "controller task panicked");
            }
        }
        tracing::info!(convo_id = %self.access.convo_id, "conversation controller stopped");
    }
}

/// Decode every message of a batch on the blocking pool.
///
/// Undecodable messages are logged and dropped. Output order is arbitrary;
/// the session sorts on merge.
async fn decode_batch(codec: &MessageCodec, raw: Vec<Message>) -> Vec<DecodedMessage> {
    let mut workers = JoinSet::new();
    for message in raw {
        let codec = codec.clone();
        workers.spawn_blocking(move || codec.decode(&message));
    }

    let mut decoded = Vec::with_capacity(workers.len());
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(message)) => decoded.push(message),
            Ok(Err(e)) => {
                tracing::warn!(message_id = e.message_id(), error = %e, "dropping message");
            },
            Err(e) => tracing::error!(error = %e, "decode worker failed"),
        }
    }
    decoded
}

async fn run_metadata_refresh(
    service: Arc<dyn ConvoService>,
    access: Arc<AccessSource>,
    period: std::time::Duration,
    tx: mpsc::UnboundedSender<Internal>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {},
        }

        let request = access.access();
        let result = tokio::select! {
            biased;
            () = token.cancelled() => break,
            result = service.fetch_metadata(&request) => result,
        };

        match result {
            Ok(metadata) => {
                if tx.send(Internal::Metadata(metadata)).is_err() {
                    break;
                }
            },
            Err(e) => tracing::debug!(
                convo_id = %access.convo_id,
                error = %e,
                "metadata refresh failed, keeping previous copy"
            ),
        }
    }
}

/// Deliver queued payloads one at a time, in submission order.
async fn run_sender(
    sender: Arc<dyn MessageSender>,
    access: Arc<AccessSource>,
    mut jobs: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<Internal>,
    scope: CancellationToken,
) {
    loop {
        let plaintext = tokio::select! {
            biased;
            () = scope.cancelled() => break,
            job = jobs.recv() => match job {
                Some(plaintext) => plaintext,
                None => break,
            },
        };
        let result = sender.send(&access.access(), &plaintext).await;
        let _ = tx.send(Internal::SendFinished(result));
    }
}

/// Cloneable command surface of a running controller.
///
/// Commands are queued and applied in order. Once the controller has shut
/// down every command returns [`ControllerError::Stopped`].
#[derive(Clone)]
pub struct ControllerHandle {
    convo_id: ConvoId,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<ConversationView>,
    events: broadcast::Sender<ConvoNotification>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle").field("convo_id", &self.convo_id).finish_non_exhaustive()
    }
}

impl ControllerHandle {
    /// Conversation this controller syncs.
    pub fn convo_id(&self) -> &str {
        &self.convo_id
    }

    /// Conversation came on screen.
    ///
    /// # Errors
    ///
    /// - `Stopped` if the controller has shut down
    pub fn open(&self) -> Result<(), ControllerError> {
        self.command(Command::Open)
    }

    /// Conversation left the screen. Polling continues at the passive rate.
    ///
    /// # Errors
    ///
    /// - `Stopped` if the controller has shut down
    pub fn close(&self) -> Result<(), ControllerError> {
        self.command(Command::Close)
    }

    /// Load one page of older history.
    ///
    /// # Errors
    ///
    /// - `Stopped` if the controller has shut down
    pub fn load_older(&self) -> Result<(), ControllerError> {
        self.command(Command::LoadOlder)
    }

    /// Queue a text message. The result arrives as a notification.
    ///
    /// # Errors
    ///
    /// - `EmptyMessage` if `text` is blank
    /// - `Stopped` if the controller has shut down
    pub fn send_text(&self, text: &str) -> Result<(), ControllerError> {
        if text.trim().is_empty() {
            return Err(ControllerError::EmptyMessage);
        }
        let payload = Payload::Text(text.to_string()).encode()?;
        self.command(Command::Send(payload))
    }

    /// Queue a file attachment. The result arrives as a notification.
    ///
    /// # Errors
    ///
    /// - `InvalidPayload` if `name` cannot be encoded
    /// - `Stopped` if the controller has shut down
    pub fn send_file(&self, name: &str, bytes: Vec<u8>) -> Result<(), ControllerError> {
        let payload = Payload::File { name: name.to_string(), bytes }.encode()?;
        self.command(Command::Send(payload))
    }

    /// Stop every timer, persist the last-seen id and release messages.
    ///
    /// Idempotent. Returns once the coordinator task has exited.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).is_ok() {
            let _ = ack.await;
        }
        if let Some(task) = self.task.lock().await.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!(convo_id = %self.convo_id, "controller panicked");
        }
    }

    /// Current view.
    pub fn view(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every republished view.
    pub fn watch(&self) -> watch::Receiver<ConversationView> {
        self.view.clone()
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConvoNotification> {
        self.events.subscribe()
    }

    fn command(&self, command: Command) -> Result<(), ControllerError> {
        self.commands.send(command).map_err(|_| ControllerError::Stopped)
    }
}
