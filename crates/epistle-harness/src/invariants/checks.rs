//! Standard conversation invariants.

use std::collections::HashSet;

use epistle_app::ConvoState;
use epistle_client::Cadence;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// No message id appears twice in a loaded sequence.
pub struct NoDuplicateIds;

impl Invariant for NoDuplicateIds {
    fn name(&self) -> &'static str {
        "no_duplicate_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for convo in &state.convos {
            let mut seen = HashSet::new();
            for message in &convo.view.messages {
                if !seen.insert(message.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "convo {}: id {} loaded twice",
                            convo.view.convo_id, message.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Messages are ordered by timestamp, ties broken by id.
pub struct SortedByTimestamp;

impl Invariant for SortedByTimestamp {
    fn name(&self) -> &'static str {
        "sorted_by_timestamp"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for convo in &state.convos {
            for pair in convo.view.messages.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                if (a.timestamp_utc, a.id) > (b.timestamp_utc, b.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "convo {}: {}@{} before {}@{}",
                            convo.view.convo_id, a.id, a.timestamp_utc, b.id, b.timestamp_utc
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The tail id is the highest loaded id, or 0 when nothing is loaded.
pub struct TailIsMaxId;

impl Invariant for TailIsMaxId {
    fn name(&self) -> &'static str {
        "tail_is_max_id"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for convo in &state.convos {
            let max = convo.view.messages.iter().map(|m| m.id).max().unwrap_or(0);
            if convo.view.tail_id != max {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "convo {}: tail {} but max loaded id {}",
                        convo.view.convo_id, convo.view.tail_id, max
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The tail never moves backwards while the conversation is alive.
pub struct TailMonotonic;

impl Invariant for TailMonotonic {
    fn name(&self) -> &'static str {
        "tail_monotonic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for convo in &state.convos {
            if convo.view.state == ConvoState::Closed {
                continue;
            }
            if convo.view.tail_id < convo.previous_tail {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "convo {}: tail went {} → {}",
                        convo.view.convo_id, convo.previous_tail, convo.view.tail_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Exactly one poll loop runs, at the cadence the state calls for.
///
/// Active polls fast, Background polls slowly, and nothing polls while
/// loading, unopened or closed.
pub struct CadenceMatchesState;

impl Invariant for CadenceMatchesState {
    fn name(&self) -> &'static str {
        "cadence_matches_state"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for convo in &state.convos {
            let view = &convo.view;
            let expected = match view.state {
                ConvoState::Active => Some(Cadence::Active),
                ConvoState::Background if !convo.backlog_settled && view.polling.is_none() => None,
                ConvoState::Background => Some(Cadence::Passive),
                ConvoState::Uninitialized | ConvoState::Loading | ConvoState::Closed => None,
            };
            if view.polling != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "convo {}: state {} polls {:?}, expected {:?}",
                        view.convo_id, view.state, view.polling, expected
                    ),
                });
            }
        }
        Ok(())
    }
}
