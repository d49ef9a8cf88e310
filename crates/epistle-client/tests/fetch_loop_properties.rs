//! Property tests for the forward polling loop.
//!
//! A server log grows and fails on a random schedule while the loop polls it
//! on a paused clock. Every appended message must be delivered exactly once
//! and the cursor must end on the highest id.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use epistle_client::{MessageFetcher, SystemEnv};
use epistle_core::{ConvoAccess, ConvoMetadata, ConvoService, Message, MessageId, ServiceError};
use proptest::prelude::*;
use tokio::sync::mpsc;

const INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
enum Step {
    Grow(u8),
    Fail,
}

#[derive(Default)]
struct LogState {
    next_id: MessageId,
    log: Vec<Message>,
    plan: VecDeque<Step>,
    tails: Vec<MessageId>,
}

struct GrowingLog {
    state: Mutex<LogState>,
}

impl GrowingLog {
    fn new(plan: Vec<Step>) -> Self {
        Self { state: Mutex::new(LogState { next_id: 1, plan: plan.into(), ..LogState::default() }) }
    }
}

#[async_trait]
impl ConvoService for GrowingLog {
    async fn fetch_last_messages(
        &self,
        _: &ConvoAccess,
        _: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        Ok(Vec::new())
    }

    async fn fetch_previous_messages(
        &self,
        _: &ConvoAccess,
        _: MessageId,
        _: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        Ok(Vec::new())
    }

    async fn fetch_messages_after(
        &self,
        _: &str,
        _: &str,
        tail_id: MessageId,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.tails.push(tail_id);
        match state.plan.pop_front() {
            Some(Step::Fail) => {
                return Err(ServiceError::Request { reason: "flaky".into() });
            },
            Some(Step::Grow(n)) => {
                for _ in 0..n {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.log.push(Message {
                        id,
                        sender_id: "bob".into(),
                        sender_name: "Bob".into(),
                        timestamp_utc: id as i64,
                        body: String::new(),
                    });
                }
            },
            None => {},
        }
        Ok(state.log.iter().filter(|m| m.id > tail_id).cloned().collect())
    }

    async fn fetch_metadata(&self, _: &ConvoAccess) -> Result<Option<ConvoMetadata>, ServiceError> {
        Ok(None)
    }
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0u8..5).prop_map(Step::Grow),
        1 => Just(Step::Fail),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_message_delivered_once(plan in prop::collection::vec(step_strategy(), 0..25)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let steps = plan.len() as u32;
        let log = Arc::new(GrowingLog::new(plan));
        let (cursor, delivered) = runtime.block_on(async {
            let fetcher = MessageFetcher::new(Arc::clone(&log) as _, SystemEnv::new());
            let (tx, mut rx) = mpsc::unbounded_channel();
            let handle = fetcher.start_auto_fetching("c1", "h", 0, INTERVAL, move |batch| {
                let _ = tx.send(batch);
            });

            tokio::time::sleep(INTERVAL * (steps + 5)).await;
            let cursor = handle.cancel_and_wait().await;

            let mut delivered = Vec::new();
            while let Ok(batch) = rx.try_recv() {
                delivered.extend(batch.into_iter().map(|m| m.id));
            }
            (cursor, delivered)
        });

        let state = log.state.lock().unwrap();
        let expected: Vec<MessageId> = state.log.iter().map(|m| m.id).collect();

        let unique: HashSet<MessageId> = delivered.iter().copied().collect();
        prop_assert_eq!(unique.len(), delivered.len(), "duplicate delivery: {:?}", delivered);

        let mut sorted = delivered.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, expected.clone());

        prop_assert_eq!(cursor, expected.last().copied().unwrap_or(0));
        prop_assert!(state.tails.windows(2).all(|w| w[0] <= w[1]), "tails: {:?}", state.tails);
    }
}
