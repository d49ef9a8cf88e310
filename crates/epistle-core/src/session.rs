//! Per-conversation message sequence.
//!
//! [`ConversationSession`] owns the ordered, deduplicated list of decoded
//! messages for one open conversation and the tail cursor used for forward
//! polling. It is plain data: exactly one coordinator mutates it.
//!
//! # Invariants
//!
//! - No two messages share an id
//! - Messages are sorted ascending by `(timestamp_utc, id)`
//! - `tail_id` equals the largest id present, or 0 when empty
//! - `tail_id` never decreases while the session lives

use std::collections::HashSet;

use epistle_proto::{ConvoId, MessageId};

use crate::codec::DecodedMessage;

/// Result of merging one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Ids that were not present before, in batch order.
    pub added: Vec<MessageId>,
    /// How many of the added messages were authored by someone else.
    pub foreign_added: usize,
}

impl MergeOutcome {
    /// True if the merge changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}

/// Ordered message state of one open conversation.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    convo_id: ConvoId,
    messages: Vec<DecodedMessage>,
    ids: HashSet<MessageId>,
    tail_id: MessageId,
    loading: bool,
    has_unseen: bool,
}

impl ConversationSession {
    /// Create an empty session for `convo_id`.
    pub fn new(convo_id: impl Into<ConvoId>) -> Self {
        Self {
            convo_id: convo_id.into(),
            messages: Vec::new(),
            ids: HashSet::new(),
            tail_id: 0,
            loading: false,
            has_unseen: false,
        }
    }

    /// Conversation this session belongs to.
    pub fn convo_id(&self) -> &str {
        &self.convo_id
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[DecodedMessage] {
        &self.messages
    }

    /// Number of loaded messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if no messages are loaded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True if a message with `id` is loaded.
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Highest loaded id, or 0.
    pub fn tail_id(&self) -> MessageId {
        self.tail_id
    }

    /// Lowest loaded id. Cursor for loading older history.
    pub fn earliest_id(&self) -> Option<MessageId> {
        self.ids.iter().copied().min()
    }

    /// Initial load or older-page load in progress.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Set the loading flag.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Messages arrived that the user has not seen.
    pub fn has_unseen(&self) -> bool {
        self.has_unseen
    }

    /// Set the unseen flag.
    pub fn set_has_unseen(&mut self, has_unseen: bool) {
        self.has_unseen = has_unseen;
    }

    /// Merge a batch of decoded messages.
    ///
    /// Messages whose id is already present are skipped, so merging the same
    /// batch twice is a no-op the second time. The sequence is re-sorted and
    /// the tail only moves forward, whatever order batches arrive in.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = DecodedMessage>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for message in batch {
            if !self.ids.insert(message.id) {
                continue;
            }
            if !message.is_own {
                outcome.foreign_added += 1;
            }
            self.tail_id = self.tail_id.max(message.id);
            outcome.added.push(message.id);
            self.messages.push(message);
        }

        if !outcome.is_empty() {
            self.messages.sort_by_key(|m| (m.timestamp_utc, m.id));
        }
        outcome
    }

    /// Merge a page of older history.
    ///
    /// Only messages strictly older than the current earliest id are taken;
    /// anything else belongs to forward polling and is ignored here.
    pub fn prepend_older(&mut self, batch: impl IntoIterator<Item = DecodedMessage>) -> MergeOutcome {
        let floor = self.earliest_id();
        self.merge(batch.into_iter().filter(|m| floor.is_none_or(|floor| m.id < floor)))
    }

    /// Drop the oldest messages until at most `max` remain.
    ///
    /// The message holding the tail id is never removed. Returns the ids that
    /// were evicted.
    pub fn truncate_to(&mut self, max: usize) -> Vec<MessageId> {
        let max = max.max(1);
        let excess = self.messages.len().saturating_sub(max);
        if excess == 0 {
            return Vec::new();
        }

        let tail_id = self.tail_id;
        let mut evicted = Vec::with_capacity(excess);
        self.messages.retain(|m| {
            if evicted.len() < excess && m.id != tail_id {
                evicted.push(m.id);
                false
            } else {
                true
            }
        });
        for id in &evicted {
            self.ids.remove(id);
        }
        evicted
    }

    /// Release every message and reset the cursor (logout).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.tail_id = 0;
        self.loading = false;
        self.has_unseen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Content;

    fn msg(id: MessageId, ts: i64, own: bool) -> DecodedMessage {
        DecodedMessage {
            id,
            sender_id: if own { "me".into() } else { "bob".into() },
            sender_name: "n".into(),
            is_own: own,
            timestamp_utc: ts,
            content: Content::Text(format!("m{id}")),
            is_from_server: false,
            system_event: None,
        }
    }

    fn ids(session: &ConversationSession) -> Vec<MessageId> {
        session.messages().iter().map(|m| m.id).collect()
    }

    #[test]
    fn merge_sorts_by_timestamp() {
        let mut session = ConversationSession::new("c1");
        let outcome = session.merge([msg(3, 30, false), msg(1, 10, true), msg(2, 20, false)]);

        assert_eq!(ids(&session), vec![1, 2, 3]);
        assert_eq!(outcome.added, vec![3, 1, 2]);
        assert_eq!(outcome.foreign_added, 2);
        assert_eq!(session.tail_id(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut session = ConversationSession::new("c1");
        session.merge([msg(1, 10, false), msg(2, 20, false)]);
        let outcome = session.merge([msg(1, 10, false), msg(2, 20, false)]);

        assert!(outcome.is_empty());
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn tail_does_not_move_backwards() {
        let mut session = ConversationSession::new("c1");
        session.merge([msg(10, 100, false)]);
        session.merge([msg(4, 40, false)]);

        assert_eq!(session.tail_id(), 10);
        assert_eq!(ids(&session), vec![4, 10]);
    }

    #[test]
    fn prepend_older_ignores_newer_ids() {
        let mut session = ConversationSession::new("c1");
        session.merge([msg(5, 50, false), msg(6, 60, false)]);
        let outcome = session.prepend_older([msg(3, 30, false), msg(7, 70, false)]);

        assert_eq!(outcome.added, vec![3]);
        assert_eq!(ids(&session), vec![3, 5, 6]);
        assert_eq!(session.tail_id(), 6);
        assert_eq!(session.earliest_id(), Some(3));
    }

    #[test]
    fn truncate_keeps_newest() {
        let mut session = ConversationSession::new("c1");
        session.merge((1..=5).map(|id| msg(id, id as i64 * 10, false)));

        let evicted = session.truncate_to(3);
        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(ids(&session), vec![3, 4, 5]);
        assert!(!session.contains(1));
    }

    #[test]
    fn truncate_never_evicts_tail() {
        let mut session = ConversationSession::new("c1");
        // Highest id carries the oldest timestamp.
        session.merge([msg(9, 1, false), msg(2, 20, false), msg(3, 30, false)]);

        let evicted = session.truncate_to(1);
        assert_eq!(evicted, vec![2, 3]);
        assert_eq!(ids(&session), vec![9]);
        assert_eq!(session.tail_id(), 9);
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = ConversationSession::new("c1");
        session.merge([msg(1, 10, false)]);
        session.set_has_unseen(true);
        session.set_loading(true);

        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.tail_id(), 0);
        assert!(!session.has_unseen());
        assert!(!session.is_loading());
        assert_eq!(session.earliest_id(), None);
    }
}
