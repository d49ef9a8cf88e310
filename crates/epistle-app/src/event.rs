//! Conversation input events.
//!
//! Events come from two sources: user intents forwarded by the frontend
//! (open, close, load older, shutdown) and results of I/O the coordinator
//! performed on behalf of earlier actions (decoded batches, metadata,
//! timeouts).

use epistle_core::{ConvoMetadata, DecodedMessage, MessageId};

/// Events processed by the [`crate::Conversation`] state machine.
#[derive(Debug, Clone)]
pub enum ConvoEvent {
    /// Conversation came on screen.
    Opened {
        /// Persisted last-seen id, if any.
        last_seen: Option<MessageId>,
    },

    /// Conversation left the screen.
    Closed,

    /// User asked for older history.
    LoadOlderRequested,

    /// Initial backlog decoded.
    BacklogLoaded(Vec<DecodedMessage>),

    /// Initial backlog request failed.
    BacklogFailed,

    /// Polled batch decoded.
    Fetched(Vec<DecodedMessage>),

    /// Older page decoded.
    OlderLoaded(Vec<DecodedMessage>),

    /// Older page request failed.
    OlderFailed,

    /// Metadata refresh finished. `None` if the server had nothing.
    MetadataFetched(Option<ConvoMetadata>),

    /// Loading safety deadline passed.
    LoadingTimeout,

    /// Logout.
    Shutdown,
}
