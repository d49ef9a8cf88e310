//! External collaborator boundaries.
//!
//! Everything the conversation pipeline consumes but does not own: the remote
//! conversation store, outbound sending, the password-hash lookup, last-seen
//! persistence and decryption. Implementations are injected explicitly; there
//! is no ambient service locator.
//!
//! Network-facing traits are async. Local lookups and persistence are
//! synchronous, like the storage traits of the server side.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use epistle_proto::{ConvoId, ConvoMetadata, Message, MessageId};

use crate::error::{DecryptError, ServiceError, StoreError};

/// Everything needed to authorize requests for one conversation.
#[derive(Clone, PartialEq, Eq)]
pub struct ConvoAccess {
    /// Conversation id.
    pub convo_id: ConvoId,
    /// SHA-512 hash of the conversation password, as expected by the server.
    pub password_hash: String,
    /// Local user id.
    pub user_id: String,
    /// Current auth token (TOTP), supplied by the caller.
    pub auth_token: String,
}

impl std::fmt::Debug for ConvoAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvoAccess")
            .field("convo_id", &self.convo_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Remote conversation store.
#[async_trait]
pub trait ConvoService: Send + Sync {
    /// Most recent `count` messages, in any order.
    async fn fetch_last_messages(
        &self,
        access: &ConvoAccess,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError>;

    /// Up to `count` messages with ids strictly below `before_id`.
    async fn fetch_previous_messages(
        &self,
        access: &ConvoAccess,
        before_id: MessageId,
        count: usize,
    ) -> Result<Vec<Message>, ServiceError>;

    /// All messages with ids strictly above `tail_id`. Polled.
    async fn fetch_messages_after(
        &self,
        convo_id: &str,
        password_hash: &str,
        tail_id: MessageId,
    ) -> Result<Vec<Message>, ServiceError>;

    /// Current metadata. `None` if the server has nothing for this user.
    async fn fetch_metadata(
        &self,
        access: &ConvoAccess,
    ) -> Result<Option<ConvoMetadata>, ServiceError>;
}

/// Outbound message delivery.
///
/// Receives the plaintext payload; per-recipient encryption belongs to the
/// implementation.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Encrypt `plaintext` for every participant and post it.
    async fn send(&self, access: &ConvoAccess, plaintext: &str) -> Result<(), ServiceError>;
}

/// Lookup of conversation password hashes. Read-only to this crate.
pub trait PasswordStore: Send + Sync {
    /// Hash for `convo_id`. `None` if the user never entered a password.
    fn password_hash(&self, convo_id: &str) -> Option<String>;
}

/// Durable per-conversation last-seen message ids.
pub trait LastSeenStore: Send + Sync {
    /// Last id the user saw in `convo_id`. `None` if never persisted.
    fn last_seen(&self, convo_id: &str) -> Option<MessageId>;

    /// Record `id` as the last id seen in `convo_id`.
    fn persist_last_seen(&self, convo_id: &str, id: MessageId) -> Result<(), StoreError>;
}

/// Black-box decryption with the local user's private key.
///
/// May be slow; callers run it off the coordinator.
pub trait Decryptor: Send + Sync {
    /// Decrypt an encrypted message body into plaintext.
    fn decrypt(&self, body: &str) -> Result<String, DecryptError>;
}

/// Source of the current auth token (TOTP). Asked once per request.
pub trait AuthTokenSource: Send + Sync {
    /// Token valid right now.
    fn current_token(&self) -> String;
}

/// Fixed token, for tests and short-lived tools.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticAuthToken(pub String);

impl AuthTokenSource for StaticAuthToken {
    fn current_token(&self) -> String {
        self.0.clone()
    }
}

impl std::fmt::Debug for StaticAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticAuthToken(..)")
    }
}

/// In-memory [`PasswordStore`].
#[derive(Clone, Default)]
pub struct MemoryPasswordStore {
    inner: Arc<Mutex<HashMap<ConvoId, String>>>,
}

impl MemoryPasswordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the hash for `convo_id`, replacing any previous one.
    pub fn insert(&self, convo_id: impl Into<ConvoId>, password_hash: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(convo_id.into(), password_hash.into());
        }
    }

    /// Forget every hash (logout).
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }
}

impl PasswordStore for MemoryPasswordStore {
    fn password_hash(&self, convo_id: &str) -> Option<String> {
        self.inner.lock().ok().and_then(|inner| inner.get(convo_id).cloned())
    }
}

/// In-memory [`LastSeenStore`] for tests and simulation.
#[derive(Clone, Default)]
pub struct MemoryLastSeenStore {
    inner: Arc<Mutex<HashMap<ConvoId, MessageId>>>,
}

impl MemoryLastSeenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastSeenStore for MemoryLastSeenStore {
    fn last_seen(&self, convo_id: &str) -> Option<MessageId> {
        self.inner.lock().ok().and_then(|inner| inner.get(convo_id).copied())
    }

    fn persist_last_seen(&self, convo_id: &str, id: MessageId) -> Result<(), StoreError> {
        let mut inner =
            self.inner.lock().map_err(|_| StoreError::Io("last-seen lock poisoned".into()))?;
        inner.insert(convo_id.to_string(), id);
        Ok(())
    }
}
