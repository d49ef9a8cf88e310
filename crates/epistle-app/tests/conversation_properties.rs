//! Property-based tests for the Conversation state machine.
//!
//! Drives the machine with arbitrary user intents interleaved with the I/O
//! completions a coordinator could actually deliver, and checks that the
//! actions it emits always describe exactly one loop at the right cadence.

use epistle_app::{ControllerConfig, Conversation, ConvoAction, ConvoEvent, ConvoState};
use epistle_client::Cadence;
use epistle_core::{Content, DecodedMessage, MessageId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Open,
    Close,
    LoadOlder,
    DeliverBacklog(Vec<MessageId>),
    FailBacklog,
    Poll(Vec<MessageId>),
    DeliverOlder(Vec<MessageId>),
    FailOlder,
    Timeout,
    Shutdown,
}

/// What the emitted actions imply the coordinator is running.
#[derive(Debug, Default)]
struct Effects {
    polling: Option<Cadence>,
    metadata_refresh: bool,
    backlog_pending: bool,
    older_pending: usize,
    persisted: Vec<MessageId>,
}

impl Effects {
    fn apply(&mut self, actions: Vec<ConvoAction>) {
        for action in actions {
            match action {
                ConvoAction::FetchBacklog { .. } => self.backlog_pending = true,
                ConvoAction::FetchOlder { .. } => self.older_pending += 1,
                ConvoAction::StartPolling { cadence, .. } => self.polling = Some(cadence),
                ConvoAction::StopPolling => self.polling = None,
                ConvoAction::StartMetadataRefresh => self.metadata_refresh = true,
                ConvoAction::StopMetadataRefresh => self.metadata_refresh = false,
                ConvoAction::PersistLastSeen { id } => self.persisted.push(id),
                ConvoAction::ScheduleLoadingTimeout
                | ConvoAction::Alert { .. }
                | ConvoAction::Notify(_)
                | ConvoAction::Publish => {},
            }
        }
    }
}

fn message(id: MessageId) -> DecodedMessage {
    DecodedMessage {
        id,
        sender_id: if id % 2 == 0 { "me".into() } else { "them".into() },
        sender_name: "name".into(),
        is_own: id % 2 == 0,
        timestamp_utc: id as i64,
        content: Content::Text(format!("#{id}")),
        is_from_server: false,
        system_event: None,
    }
}

fn batch(ids: &[MessageId]) -> Vec<DecodedMessage> {
    ids.iter().copied().map(message).collect()
}

fn ids() -> impl Strategy<Value = Vec<MessageId>> {
    prop::collection::vec(1u64..120, 0..8)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Open),
        3 => Just(Op::Close),
        1 => Just(Op::LoadOlder),
        2 => ids().prop_map(Op::DeliverBacklog),
        1 => Just(Op::FailBacklog),
        4 => ids().prop_map(Op::Poll),
        1 => ids().prop_map(Op::DeliverOlder),
        1 => Just(Op::FailOlder),
        1 => Just(Op::Timeout),
        1 => Just(Op::Shutdown),
    ]
}

/// Translate an op into an event, skipping completions nobody asked for.
fn event_for(op: Op, effects: &mut Effects) -> Option<ConvoEvent> {
    match op {
        Op::Open => Some(ConvoEvent::Opened { last_seen: None }),
        Op::Close => Some(ConvoEvent::Closed),
        Op::LoadOlder => Some(ConvoEvent::LoadOlderRequested),
        Op::DeliverBacklog(ids) if effects.backlog_pending => {
            effects.backlog_pending = false;
            Some(ConvoEvent::BacklogLoaded(batch(&ids)))
        },
        Op::FailBacklog if effects.backlog_pending => {
            effects.backlog_pending = false;
            Some(ConvoEvent::BacklogFailed)
        },
        Op::Poll(ids) if effects.polling.is_some() => Some(ConvoEvent::Fetched(batch(&ids))),
        Op::DeliverOlder(ids) if effects.older_pending > 0 => {
            effects.older_pending -= 1;
            Some(ConvoEvent::OlderLoaded(batch(&ids)))
        },
        Op::FailOlder if effects.older_pending > 0 => {
            effects.older_pending -= 1;
            Some(ConvoEvent::OlderFailed)
        },
        Op::Timeout => Some(ConvoEvent::LoadingTimeout),
        Op::Shutdown => Some(ConvoEvent::Shutdown),
        _ => None,
    }
}

fn check(convo: &Conversation, effects: &Effects) -> Result<(), TestCaseError> {
    // Forward polling from tail 0 would pull the whole history
    if effects.backlog_pending {
        prop_assert_eq!(effects.polling, None, "loop started before the backlog landed");
    }

    match convo.state() {
        ConvoState::Uninitialized | ConvoState::Loading => {
            prop_assert_eq!(effects.polling, None);
            prop_assert!(!effects.metadata_refresh);
        },
        ConvoState::Active => {
            prop_assert_eq!(effects.polling, Some(Cadence::Active));
            prop_assert!(effects.metadata_refresh);
        },
        ConvoState::Background => {
            prop_assert!(!effects.metadata_refresh);
            // Closed while loading: the passive loop waits for the backlog
            if effects.backlog_pending && effects.polling.is_none() {
                return Ok(());
            }
            prop_assert_eq!(effects.polling, Some(Cadence::Passive));
        },
        ConvoState::Closed => {
            prop_assert_eq!(effects.polling, None);
            prop_assert!(!effects.metadata_refresh);
            prop_assert!(convo.session().is_empty());
        },
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_one_loop_at_the_right_cadence(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut convo = Conversation::new("c1", &ControllerConfig::default());
        let mut effects = Effects::default();

        for op in ops {
            let Some(event) = event_for(op, &mut effects) else { continue };
            effects.apply(convo.handle(event));
            check(&convo, &effects)?;
        }
    }

    #[test]
    fn prop_tail_never_moves_backwards(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut convo = Conversation::new("c1", &ControllerConfig::default());
        let mut effects = Effects::default();
        let mut tail = 0;

        for op in ops {
            let Some(event) = event_for(op, &mut effects) else { continue };
            effects.apply(convo.handle(event));
            if convo.state() == ConvoState::Closed {
                break;
            }
            prop_assert!(convo.session().tail_id() >= tail);
            tail = convo.session().tail_id();
        }
    }

    #[test]
    fn prop_persisted_ids_are_real_tails(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut convo = Conversation::new("c1", &ControllerConfig::default());
        let mut effects = Effects::default();
        let mut tail = 0;

        for op in ops {
            let Some(event) = event_for(op, &mut effects) else { continue };
            effects.persisted.clear();
            effects.apply(convo.handle(event));
            for id in &effects.persisted {
                prop_assert_ne!(*id, 0);
                prop_assert!(*id >= tail, "persisted {} below earlier tail {}", id, tail);
            }
            tail = tail.max(convo.session().tail_id());
        }
    }

    #[test]
    fn prop_closed_ignores_everything(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let mut convo = Conversation::new("c1", &ControllerConfig::default());
        convo.handle(ConvoEvent::Shutdown);
        let mut effects = Effects::default();

        for op in ops {
            let Some(event) = event_for(op, &mut effects) else { continue };
            prop_assert!(convo.handle(event).is_empty());
            prop_assert_eq!(convo.state(), ConvoState::Closed);
        }
    }
}
