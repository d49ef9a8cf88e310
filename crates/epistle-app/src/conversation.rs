//! Active-conversation state machine.
//!
//! This module defines [`Conversation`], the non-UI logic of one open
//! conversation, completely decoupled from I/O. It consumes
//! [`crate::ConvoEvent`]s and produces [`crate::ConvoAction`]s for the
//! coordinator to execute.
//!
//! ```text
//! Uninitialized ──Opened──▶ Loading ──BacklogLoaded──▶ Active ⇄ Background
//!                                                          │         │
//!                                                          └─Shutdown┴──▶ Closed
//! ```
//!
//! # Responsibilities
//!
//! - Owns the [`ConversationSession`] and applies every merge to it.
//! - Decides cadence: fast while on screen, slow in the background, none
//!   while loading or closed.
//! - Decides when to persist the last-seen id and when to alert.

use epistle_client::Cadence;
use epistle_core::{ConversationSession, ConvoId, ConvoMetadata, DecodedMessage, MessageId};

use crate::{ControllerConfig, ConvoAction, ConvoEvent, ConvoNotification, ConvoState};

/// Conversation state machine.
///
/// Pure: no I/O, no clock. Fully testable by feeding events.
#[derive(Debug, Clone)]
pub struct Conversation {
    state: ConvoState,
    session: ConversationSession,
    metadata: Option<ConvoMetadata>,
    /// Last-seen id read when the conversation was opened.
    last_seen: Option<MessageId>,
    /// Backlog requested and not yet settled. No poll loop may start before it lands.
    backlog_pending: bool,
    page_size: usize,
    max_loaded: usize,
}

impl Conversation {
    /// Create an unopened conversation.
    pub fn new(convo_id: impl Into<ConvoId>, config: &ControllerConfig) -> Self {
        Self {
            state: ConvoState::Uninitialized,
            session: ConversationSession::new(convo_id),
            metadata: None,
            last_seen: None,
            backlog_pending: false,
            page_size: config.page_size,
            max_loaded: config.max_loaded_messages,
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> ConvoState {
        self.state
    }

    /// Ordered messages and cursor.
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Latest known metadata.
    pub fn metadata(&self) -> Option<&ConvoMetadata> {
        self.metadata.as_ref()
    }

    /// Cadence this state calls for. `None` while loading or closed.
    pub fn expected_cadence(&self) -> Option<Cadence> {
        match self.state {
            ConvoState::Active => Some(Cadence::Active),
            ConvoState::Background => Some(Cadence::Passive),
            ConvoState::Uninitialized | ConvoState::Loading | ConvoState::Closed => None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: ConvoEvent) -> Vec<ConvoAction> {
        if self.state == ConvoState::Closed {
            return Vec::new();
        }

        match event {
            ConvoEvent::Opened { last_seen } => self.on_opened(last_seen),
            ConvoEvent::Closed => self.on_closed(),
            ConvoEvent::LoadOlderRequested => self.on_load_older(),
            ConvoEvent::BacklogLoaded(batch) => self.on_backlog(batch),
            ConvoEvent::BacklogFailed => self.on_backlog(Vec::new()),
            ConvoEvent::Fetched(batch) => self.on_fetched(batch),
            ConvoEvent::OlderLoaded(batch) => {
                self.session.prepend_older(batch);
                self.session.set_loading(false);
                vec![ConvoAction::Publish]
            },
            ConvoEvent::OlderFailed | ConvoEvent::LoadingTimeout => {
                if !self.session.is_loading() {
                    return Vec::new();
                }
                self.session.set_loading(false);
                vec![ConvoAction::Publish]
            },
            ConvoEvent::MetadataFetched(metadata) => self.on_metadata(metadata),
            ConvoEvent::Shutdown => self.on_shutdown(),
        }
    }

    fn on_opened(&mut self, last_seen: Option<MessageId>) -> Vec<ConvoAction> {
        self.last_seen = last_seen;

        match self.state {
            ConvoState::Uninitialized if self.session.is_empty() => {
                self.state = ConvoState::Loading;
                self.backlog_pending = true;
                self.session.set_loading(true);
                tracing::debug!(convo_id = self.session.convo_id(), "loading backlog");
                vec![
                    ConvoAction::FetchBacklog { count: self.page_size },
                    ConvoAction::ScheduleLoadingTimeout,
                    ConvoAction::Publish,
                ]
            },
            // Reopened before the backlog landed; it will start polling.
            ConvoState::Background if self.backlog_pending => {
                self.state = ConvoState::Loading;
                vec![ConvoAction::Publish]
            },
            ConvoState::Uninitialized | ConvoState::Background => {
                self.state = ConvoState::Active;
                self.refresh_unseen_from_last_seen();
                self.enter_active()
            },
            // Backlog still in flight; it will start polling when it lands.
            ConvoState::Loading | ConvoState::Active | ConvoState::Closed => Vec::new(),
        }
    }

    fn on_closed(&mut self) -> Vec<ConvoAction> {
        match self.state {
            ConvoState::Active => {
                self.state = ConvoState::Background;
                self.session.set_has_unseen(false);
                let tail = self.session.tail_id();
                let mut actions = vec![
                    ConvoAction::StartPolling { cadence: Cadence::Passive, from: tail },
                    ConvoAction::StopMetadataRefresh,
                ];
                actions.extend(self.persist_tail());
                actions.push(ConvoAction::Publish);
                actions
            },
            ConvoState::Loading => {
                // Polling starts once the backlog lands.
                self.state = ConvoState::Background;
                self.session.set_has_unseen(false);
                vec![ConvoAction::Publish]
            },
            ConvoState::Uninitialized | ConvoState::Background | ConvoState::Closed => Vec::new(),
        }
    }

    fn on_load_older(&mut self) -> Vec<ConvoAction> {
        if self.session.is_loading() {
            return Vec::new();
        }
        let Some(before_id) = self.session.earliest_id() else {
            return Vec::new();
        };
        self.session.set_loading(true);
        vec![ConvoAction::FetchOlder { before_id, count: self.page_size }, ConvoAction::Publish]
    }

    fn on_backlog(&mut self, batch: Vec<DecodedMessage>) -> Vec<ConvoAction> {
        self.backlog_pending = false;
        self.session.merge(batch);
        self.session.set_loading(false);

        match self.state {
            ConvoState::Loading => {
                self.state = ConvoState::Active;
                self.refresh_unseen_from_last_seen();
                tracing::debug!(
                    convo_id = self.session.convo_id(),
                    tail_id = self.session.tail_id(),
                    count = self.session.len(),
                    "backlog loaded"
                );
                self.enter_active()
            },
            ConvoState::Background => vec![
                ConvoAction::StartPolling {
                    cadence: Cadence::Passive,
                    from: self.session.tail_id(),
                },
                ConvoAction::Publish,
            ],
            ConvoState::Uninitialized | ConvoState::Active | ConvoState::Closed => {
                vec![ConvoAction::Publish]
            },
        }
    }

    fn on_fetched(&mut self, batch: Vec<DecodedMessage>) -> Vec<ConvoAction> {
        let outcome = self.session.merge(batch);
        if outcome.is_empty() {
            return Vec::new();
        }
        self.session.truncate_to(self.max_loaded);

        let mut actions = Vec::new();
        if outcome.foreign_added > 0 {
            self.session.set_has_unseen(true);
            actions.push(ConvoAction::Alert { count: outcome.foreign_added });
        }
        actions.push(ConvoAction::Notify(ConvoNotification::NewMessages {
            convo_id: self.session.convo_id().to_string(),
            count: outcome.added.len(),
        }));
        actions.push(ConvoAction::Publish);
        actions
    }

    fn on_metadata(&mut self, metadata: Option<ConvoMetadata>) -> Vec<ConvoAction> {
        let Some(metadata) = metadata else {
            return Vec::new();
        };
        if self.metadata.as_ref() == Some(&metadata) {
            return Vec::new();
        }
        self.metadata = Some(metadata.clone());
        vec![
            ConvoAction::Notify(ConvoNotification::MetadataChanged {
                convo_id: self.session.convo_id().to_string(),
                metadata,
            }),
            ConvoAction::Publish,
        ]
    }

    fn on_shutdown(&mut self) -> Vec<ConvoAction> {
        let mut actions = vec![ConvoAction::StopPolling, ConvoAction::StopMetadataRefresh];
        actions.extend(self.persist_tail());

        self.state = ConvoState::Closed;
        self.session.clear();
        self.metadata = None;
        actions.push(ConvoAction::Publish);
        actions
    }

    fn enter_active(&self) -> Vec<ConvoAction> {
        vec![
            ConvoAction::StartPolling { cadence: Cadence::Active, from: self.session.tail_id() },
            ConvoAction::StartMetadataRefresh,
            ConvoAction::Publish,
        ]
    }

    fn refresh_unseen_from_last_seen(&mut self) {
        let tail = self.session.tail_id();
        if tail != 0 && self.last_seen != Some(tail) {
            self.session.set_has_unseen(true);
        }
    }

    fn persist_tail(&self) -> Option<ConvoAction> {
        let id = self.session.tail_id();
        (id != 0).then_some(ConvoAction::PersistLastSeen { id })
    }
}
