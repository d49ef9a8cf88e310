//! Conversation metadata as returned by the conversation store.

use serde::{Deserialize, Serialize};

/// Conversation metadata.
///
/// Compared by value: the controller replaces its local copy only when a
/// freshly fetched record differs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConvoMetadata {
    /// Conversation id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Admin's user id.
    pub creator_id: String,
    /// Expiration time in Unix seconds (UTC).
    #[serde(rename = "ExpirationUTC")]
    pub expiration_utc: i64,
    /// Participant user ids.
    pub participants: Vec<String>,
    /// Banned user ids.
    pub banned_users: Vec<String>,
}

impl ConvoMetadata {
    /// Whether `user_id` is currently a participant.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}
