//! In-memory conversation server for simulation.
//!
//! `SimServer` implements both [`ConvoService`] and [`MessageSender`] over a
//! shared map of conversations. Bodies are stored as plaintext, so pair it
//! with [`crate::PlainDecryptor`]. Every request is counted, and a seeded
//! RNG injects transient failures reproducibly.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use epistle_core::{
    ConvoAccess, ConvoId, ConvoMetadata, ConvoService, Message, MessageId, MessageSender,
    ServiceError,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// First timestamp handed out by [`SimServer::post`].
const EPOCH: i64 = 1_700_000_000;

/// Requests served, per route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    /// Most-recent page requests.
    pub last: usize,
    /// Older page requests.
    pub previous: usize,
    /// Forward polls.
    pub after: usize,
    /// Metadata requests.
    pub metadata: usize,
    /// Outbound sends.
    pub send: usize,
}

/// Plaintext accepted by the sender side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Conversation it was posted to.
    pub convo_id: ConvoId,
    /// Author.
    pub user_id: String,
    /// Encoded payload.
    pub plaintext: String,
    /// Id it was stored under.
    pub id: MessageId,
}

struct ConvoRecord {
    password_hash: String,
    messages: Vec<Message>,
    metadata: Option<ConvoMetadata>,
}

struct ServerState {
    convos: HashMap<ConvoId, ConvoRecord>,
    next_id: MessageId,
    clock: i64,
    counts: RequestCounts,
    after_tails: Vec<MessageId>,
    sent: Vec<SentMessage>,
    rng: ChaCha8Rng,
    failure_rate: f64,
}

impl ServerState {
    fn authorize(&self, convo_id: &str, password_hash: &str) -> Result<&ConvoRecord, ServiceError> {
        let record = self.convos.get(convo_id).ok_or(ServiceError::Status { status: 404 })?;
        if record.password_hash != password_hash {
            return Err(ServiceError::Unauthorized);
        }
        Ok(record)
    }

    fn maybe_fail(&mut self) -> Result<(), ServiceError> {
        if self.failure_rate > 0.0 && self.rng.gen_bool(self.failure_rate) {
            return Err(ServiceError::Request { reason: "injected failure".into() });
        }
        Ok(())
    }

    fn append(&mut self, convo_id: &str, sender_id: &str, body: String, timestamp: i64) -> MessageId {
        let id = self.next_id;
        if let Some(record) = self.convos.get_mut(convo_id) {
            self.next_id += 1;
            record.messages.push(Message {
                id,
                sender_id: sender_id.to_string(),
                sender_name: sender_id.to_string(),
                timestamp_utc: timestamp,
                body,
            });
        }
        id
    }
}

/// In-memory conversation server.
pub struct SimServer {
    state: Mutex<ServerState>,
    latency: Duration,
}

impl SimServer {
    /// Create an empty server with a seeded failure RNG.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(ServerState {
                convos: HashMap::new(),
                next_id: 1,
                clock: EPOCH,
                counts: RequestCounts::default(),
                after_tails: Vec::new(),
                sent: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                failure_rate: 0.0,
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every request by `latency` on the tokio clock.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a conversation guarded by `password_hash`.
    pub fn create_convo(&self, convo_id: &str, password_hash: &str) {
        self.lock().convos.insert(
            convo_id.to_string(),
            ConvoRecord {
                password_hash: password_hash.to_string(),
                messages: Vec::new(),
                metadata: None,
            },
        );
    }

    /// Append a message with the next timestamp. Returns its id, or the id
    /// that would have been used if the conversation does not exist.
    pub fn post(&self, convo_id: &str, sender_id: &str, body: &str) -> MessageId {
        let mut state = self.lock();
        state.clock += 1;
        let timestamp = state.clock;
        state.append(convo_id, sender_id, body.to_string(), timestamp)
    }

    /// Append a message with an explicit timestamp.
    pub fn post_at(&self, convo_id: &str, sender_id: &str, body: &str, timestamp: i64) -> MessageId {
        self.lock().append(convo_id, sender_id, body.to_string(), timestamp)
    }

    /// Replace the stored metadata.
    pub fn set_metadata(&self, convo_id: &str, metadata: ConvoMetadata) {
        if let Some(record) = self.lock().convos.get_mut(convo_id) {
            record.metadata = Some(metadata);
        }
    }

    /// Probability in `[0, 1]` that a request fails with a transient error.
    pub fn set_failure_rate(&self, rate: f64) {
        self.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    /// Requests served so far.
    pub fn counts(&self) -> RequestCounts {
        self.lock().counts
    }

    /// Cursor sent with every forward poll, in arrival order.
    pub fn after_tails(&self) -> Vec<MessageId> {
        self.lock().after_tails.clone()
    }

    /// Everything accepted by [`MessageSender::send`].
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Stored messages of `convo_id`.
    pub fn messages(&self, convo_id: &str) -> Vec<Message> {
        self.lock().convos.get(convo_id).map(|r| r.messages.clone()).unwrap_or_default()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Highest `count` messages of `messages` matching `filter`, ascending.
fn last_n(messages: &[Message], count: usize, filter: impl Fn(&Message) -> bool) -> Vec<Message> {
    let mut page: Vec<Message> = messages.iter().filter(|m| filter(m)).cloned().collect();
    page.sort_by_key(|m| m.id);
    let skip = page.len().saturating_sub(count);
    page.split_off(skip)
}

#[async_trait]
impl ConvoService for SimServer {
    async fn fetch_last_messages(
        &self,
        access: &ConvoAccess,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.last += 1;
        state.maybe_fail()?;
        let record = state.authorize(&access.convo_id, &access.password_hash)?;
        Ok(last_n(&record.messages, count, |_| true))
    }

    async fn fetch_previous_messages(
        &self,
        access: &ConvoAccess,
        before_id: MessageId,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.previous += 1;
        state.maybe_fail()?;
        let record = state.authorize(&access.convo_id, &access.password_hash)?;
        Ok(last_n(&record.messages, count, |m| m.id < before_id))
    }

    async fn fetch_messages_after(
        &self,
        convo_id: &str,
        password_hash: &str,
        tail_id: MessageId,
    ) -> Result<Vec<Message>, ServiceError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.after += 1;
        state.after_tails.push(tail_id);
        state.maybe_fail()?;
        let record = state.authorize(convo_id, password_hash)?;
        Ok(last_n(&record.messages, usize::MAX, |m| m.id > tail_id))
    }

    async fn fetch_metadata(
        &self,
        access: &ConvoAccess,
    ) -> Result<Option<ConvoMetadata>, ServiceError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.metadata += 1;
        state.maybe_fail()?;
        let record = state.authorize(&access.convo_id, &access.password_hash)?;
        Ok(record.metadata.clone())
    }
}

#[async_trait]
impl MessageSender for SimServer {
    async fn send(&self, access: &ConvoAccess, plaintext: &str) -> Result<(), ServiceError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.send += 1;
        state.maybe_fail()?;
        state.authorize(&access.convo_id, &access.password_hash)?;

        state.clock += 1;
        let timestamp = state.clock;
        let id = state.append(&access.convo_id, &access.user_id, plaintext.to_string(), timestamp);
        state.sent.push(SentMessage {
            convo_id: access.convo_id.clone(),
            user_id: access.user_id.clone(),
            plaintext: plaintext.to_string(),
            id,
        });
        tracing::trace!(convo_id = %access.convo_id, id, "sim server stored message");
        Ok(())
    }
}
