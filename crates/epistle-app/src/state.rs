//! Observable conversation state.
//!
//! [`ConversationView`] is what a frontend renders; it is republished after
//! every coordinator step. [`ConvoNotification`]s are one-off events for
//! subscribers outside the conversation screen (list badges, send results).

use std::fmt;

use epistle_client::Cadence;
use epistle_core::{ConvoId, ConvoMetadata, DecodedMessage, MessageId};

/// Lifecycle of an active-conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvoState {
    /// Never opened.
    Uninitialized,
    /// Initial backlog in flight.
    Loading,
    /// On screen: fast polling, metadata refresh running.
    Active,
    /// Left but retained: slow polling.
    Background,
    /// Shut down: no timers, messages released.
    Closed,
}

impl fmt::Display for ConvoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Background => "background",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Render-ready snapshot of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    /// Conversation id.
    pub convo_id: ConvoId,
    /// Lifecycle state.
    pub state: ConvoState,
    /// Loaded messages in display order.
    pub messages: Vec<DecodedMessage>,
    /// Highest loaded id, or 0.
    pub tail_id: MessageId,
    /// Spinner flag.
    pub loading: bool,
    /// Badge flag.
    pub has_unseen: bool,
    /// Latest known metadata.
    pub metadata: Option<ConvoMetadata>,
    /// Cadence of the running poll loop. `None` if not polling.
    pub polling: Option<Cadence>,
}

impl ConversationView {
    /// View of a conversation that was never opened.
    pub fn empty(convo_id: impl Into<ConvoId>) -> Self {
        Self {
            convo_id: convo_id.into(),
            state: ConvoState::Uninitialized,
            messages: Vec::new(),
            tail_id: 0,
            loading: false,
            has_unseen: false,
            metadata: None,
            polling: None,
        }
    }
}

/// Events published for subscribers outside the conversation screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvoNotification {
    /// New messages were merged.
    NewMessages {
        /// Conversation id
        convo_id: ConvoId,
        /// Number of messages added
        count: usize,
    },

    /// Metadata differs from the previously held copy.
    MetadataChanged {
        /// Conversation id
        convo_id: ConvoId,
        /// New metadata
        metadata: ConvoMetadata,
    },

    /// An outbound message was accepted by the server.
    SendCompleted {
        /// Conversation id
        convo_id: ConvoId,
    },

    /// An outbound message could not be delivered.
    SendFailed {
        /// Conversation id
        convo_id: ConvoId,
        /// Failure description
        reason: String,
    },
}
