//! Observable state snapshots for invariant checking.
//!
//! Invariants run against snapshots rather than live controllers so every
//! check sees one consistent published view.

use epistle_app::ConversationView;
use epistle_core::MessageId;

/// Snapshot of every controller in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-conversation snapshots.
    pub convos: Vec<ConvoSnapshot>,
}

impl SystemSnapshot {
    /// Create a snapshot with a single conversation.
    pub fn single(convo: ConvoSnapshot) -> Self {
        Self { convos: vec![convo] }
    }
}

/// One published view plus the history needed to judge it.
#[derive(Debug, Clone)]
pub struct ConvoSnapshot {
    /// Published view.
    pub view: ConversationView,
    /// Tail of the previous snapshot of the same conversation.
    pub previous_tail: MessageId,
    /// The initial backlog request has completed.
    ///
    /// A conversation closed while loading waits for its backlog before it
    /// starts polling; until then no poll loop is expected.
    pub backlog_settled: bool,
}

impl ConvoSnapshot {
    /// Snapshot of `view` taken after the backlog completed.
    pub fn new(view: ConversationView, previous_tail: MessageId) -> Self {
        Self { view, previous_tail, backlog_settled: true }
    }

    /// Mark the backlog as still in flight.
    #[must_use]
    pub fn with_backlog_pending(mut self) -> Self {
        self.backlog_settled = false;
        self
    }
}
