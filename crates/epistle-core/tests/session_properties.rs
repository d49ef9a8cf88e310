//! Property-based tests for ConversationSession merging.
//!
//! Arbitrary interleavings of forward batches, older pages and truncation
//! must keep the sequence deduplicated, sorted and anchored at the maximum id.

use std::collections::HashSet;

use epistle_core::{Content, ConversationSession, DecodedMessage, MessageId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Merge(Vec<(MessageId, i64)>),
    Older(Vec<(MessageId, i64)>),
    Truncate(usize),
}

fn message(id: MessageId, ts: i64) -> DecodedMessage {
    DecodedMessage {
        id,
        sender_id: format!("u{}", id % 3),
        sender_name: "user".into(),
        is_own: id % 3 == 0,
        timestamp_utc: ts,
        content: Content::Text(format!("#{id}")),
        is_from_server: false,
        system_event: None,
    }
}

fn batch_strategy() -> impl Strategy<Value = Vec<(MessageId, i64)>> {
    prop::collection::vec((1u64..200, 0i64..1_000), 0..12)
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => batch_strategy().prop_map(Step::Merge),
        1 => batch_strategy().prop_map(Step::Older),
        1 => (1usize..20).prop_map(Step::Truncate),
    ]
}

fn assert_invariants(session: &ConversationSession) -> Result<(), TestCaseError> {
    let ids: Vec<MessageId> = session.messages().iter().map(|m| m.id).collect();
    let unique: HashSet<MessageId> = ids.iter().copied().collect();
    prop_assert_eq!(unique.len(), ids.len(), "duplicate ids: {:?}", ids);

    let sorted = session
        .messages()
        .windows(2)
        .all(|w| (w[0].timestamp_utc, w[0].id) <= (w[1].timestamp_utc, w[1].id));
    prop_assert!(sorted, "not sorted: {:?}", ids);

    prop_assert_eq!(session.tail_id(), ids.iter().copied().max().unwrap_or(0));
    Ok(())
}

proptest! {
    #[test]
    fn prop_invariants_hold_for_any_steps(steps in prop::collection::vec(step_strategy(), 0..30)) {
        let mut session = ConversationSession::new("convo");
        let mut last_tail = 0;

        for step in steps {
            match step {
                Step::Merge(batch) => {
                    session.merge(batch.into_iter().map(|(id, ts)| message(id, ts)));
                },
                Step::Older(batch) => {
                    session.prepend_older(batch.into_iter().map(|(id, ts)| message(id, ts)));
                },
                Step::Truncate(max) => {
                    session.truncate_to(max);
                },
            }

            assert_invariants(&session)?;
            prop_assert!(session.tail_id() >= last_tail, "tail moved backwards");
            last_tail = session.tail_id();
        }
    }

    #[test]
    fn prop_tail_is_max_ever_observed(batches in prop::collection::vec(batch_strategy(), 1..10)) {
        let mut session = ConversationSession::new("convo");
        let mut max_seen = 0;

        for batch in batches {
            max_seen = batch.iter().map(|(id, _)| *id).fold(max_seen, MessageId::max);
            session.merge(batch.into_iter().map(|(id, ts)| message(id, ts)));
            prop_assert_eq!(session.tail_id(), max_seen);
        }
    }

    #[test]
    fn prop_remerge_is_noop(batch in batch_strategy()) {
        let mut session = ConversationSession::new("convo");
        session.merge(batch.iter().map(|&(id, ts)| message(id, ts)));
        let before: Vec<MessageId> = session.messages().iter().map(|m| m.id).collect();

        let outcome = session.merge(batch.iter().map(|&(id, ts)| message(id, ts)));
        let after: Vec<MessageId> = session.messages().iter().map(|m| m.id).collect();

        prop_assert!(outcome.is_empty());
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_merge_order_does_not_matter(batch in batch_strategy()) {
        // Distinct ids only; duplicate ids with different timestamps keep the first.
        let mut seen = HashSet::new();
        let batch: Vec<_> = batch.into_iter().filter(|(id, _)| seen.insert(*id)).collect();

        let mut forward = ConversationSession::new("convo");
        forward.merge(batch.iter().map(|&(id, ts)| message(id, ts)));

        let mut reversed = ConversationSession::new("convo");
        reversed.merge(batch.iter().rev().map(|&(id, ts)| message(id, ts)));

        prop_assert_eq!(forward.messages(), reversed.messages());
    }

    #[test]
    fn prop_truncate_respects_bound(batch in batch_strategy(), max in 1usize..10) {
        let mut session = ConversationSession::new("convo");
        session.merge(batch.into_iter().map(|(id, ts)| message(id, ts)));
        let tail = session.tail_id();

        session.truncate_to(max);
        prop_assert!(session.len() <= max);
        if tail != 0 {
            prop_assert!(session.contains(tail));
        }
    }
}
