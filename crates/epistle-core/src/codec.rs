//! Message decoding.
//!
//! [`MessageCodec`] turns one raw [`Message`] into one [`DecodedMessage`].
//! Server markers are parsed and localized without touching the decryptor;
//! everything else is decrypted and parsed as a [`Payload`].
//!
//! Decoding is pure apart from the decryptor call. Failures are returned, not
//! logged: the caller decides how to report a dropped message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use epistle_proto::{Message, MessageId, Payload, SystemEvent, SystemMessage};

use crate::{
    error::DecodeError,
    localization::{Localizer, keys, render},
    service::Decryptor,
};

/// Displayable content of a decoded message.
///
/// Exactly one of text or attachment; system messages are always text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Localized or user-authored text.
    Text(String),
    /// File attachment.
    Attachment {
        /// Original file name.
        name: String,
        /// Raw file bytes.
        bytes: Vec<u8>,
    },
}

/// Client-side view of one message.
///
/// Built once from a [`Message`] and treated as immutable display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Server-assigned id.
    pub id: MessageId,
    /// Author's user id.
    pub sender_id: String,
    /// Author's display name.
    pub sender_name: String,
    /// Authored by the local user.
    pub is_own: bool,
    /// Send time in Unix seconds (UTC).
    pub timestamp_utc: i64,
    /// Text or attachment.
    pub content: Content,
    /// Server-authored broadcast.
    pub is_from_server: bool,
    /// Structured meaning of a server broadcast. `None` for user messages.
    pub system_event: Option<SystemEvent>,
}

impl DecodedMessage {
    /// Display text. `None` for attachments.
    pub fn display_text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text.as_str()),
            Content::Attachment { .. } => None,
        }
    }

    /// Attachment name and bytes. `None` for text.
    pub fn attachment(&self) -> Option<(&str, &[u8])> {
        match &self.content {
            Content::Text(_) => None,
            Content::Attachment { name, bytes } => Some((name.as_str(), bytes.as_slice())),
        }
    }

    /// Send time as a UTC date. `None` if the timestamp is out of range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp_utc, 0)
    }
}

/// Decodes raw messages for one local user.
///
/// Cheap to clone; decode workers each hold a clone.
#[derive(Clone)]
pub struct MessageCodec {
    local_user_id: Arc<str>,
    decryptor: Arc<dyn Decryptor>,
    localizer: Arc<dyn Localizer>,
}

impl MessageCodec {
    /// Create a codec for `local_user_id`.
    pub fn new(
        local_user_id: impl Into<Arc<str>>,
        decryptor: Arc<dyn Decryptor>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self { local_user_id: local_user_id.into(), decryptor, localizer }
    }

    /// Local user id used for `is_own`.
    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Decode one message.
    ///
    /// # Errors
    ///
    /// - `MalformedSystemMessage` for a server marker that does not parse
    /// - `DecryptionFailed` if the decryptor rejects the body
    /// - `MalformedPayload` if the plaintext matches neither grammar
    pub fn decode(&self, message: &Message) -> Result<DecodedMessage, DecodeError> {
        let (content, system_event) = if message.is_from_server() {
            let event = SystemMessage::parse(&message.body)
                .and_then(|parsed| parsed.event())
                .map_err(|e| DecodeError::from_protocol(message.id, e))?;
            (Content::Text(self.system_text(&event)), Some(event))
        } else {
            let plaintext = self.decryptor.decrypt(&message.body).map_err(|e| {
                DecodeError::DecryptionFailed { message_id: message.id, reason: e.reason }
            })?;
            let content = match Payload::parse(&plaintext)
                .map_err(|e| DecodeError::from_protocol(message.id, e))?
            {
                Payload::Text(text) => Content::Text(text),
                Payload::File { name, bytes } => Content::Attachment { name, bytes },
            };
            (content, None)
        };

        Ok(DecodedMessage {
            id: message.id,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            is_own: message.sender_id == *self.local_user_id,
            timestamp_utc: message.timestamp_utc,
            content,
            is_from_server: message.is_from_server(),
            system_event,
        })
    }

    fn system_text(&self, event: &SystemEvent) -> String {
        let localizer = self.localizer.as_ref();
        match event {
            SystemEvent::UserJoined { user } => render(localizer, keys::USER_JOINED, user),
            SystemEvent::UserLeft { user } => render(localizer, keys::USER_LEFT, user),
            SystemEvent::UserKicked { user } => render(localizer, keys::USER_KICKED, user),
            SystemEvent::ConvoExpiringSoon { detail } => {
                render(localizer, keys::CONVO_EXPIRING_SOON, detail)
            },
            SystemEvent::MetadataChanged(changes) => {
                let fields: Vec<String> = changes
                    .names()
                    .map(|name| localizer.translate(&format!("{}{name}", keys::FIELD_PREFIX)))
                    .collect();
                render(localizer, keys::METADATA_CHANGED, &fields.join(", "))
            },
            SystemEvent::Unknown { .. } => String::new(),
        }
    }
}

impl std::fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCodec").field("local_user_id", &self.local_user_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use epistle_proto::MetadataChanges;

    use super::*;
    use crate::{error::DecryptError, localization::EnglishLocalizer};

    /// Treats the body as plaintext unless it is `BAD`.
    struct PassthroughDecryptor;

    impl Decryptor for PassthroughDecryptor {
        fn decrypt(&self, body: &str) -> Result<String, DecryptError> {
            if body == "BAD" { Err(DecryptError::new("bad key")) } else { Ok(body.to_string()) }
        }
    }

    /// Panics if asked to decrypt.
    struct ForbiddenDecryptor;

    impl Decryptor for ForbiddenDecryptor {
        fn decrypt(&self, _body: &str) -> Result<String, DecryptError> {
            panic!("system messages must not be decrypted");
        }
    }

    fn codec(decryptor: Arc<dyn Decryptor>) -> MessageCodec {
        MessageCodec::new("me", decryptor, Arc::new(EnglishLocalizer))
    }

    fn message(id: MessageId, sender: &str, body: &str) -> Message {
        Message {
            id,
            sender_id: sender.into(),
            sender_name: sender.into(),
            timestamp_utc: 1_700_000_000 + id as i64,
            body: body.into(),
        }
    }

    #[test]
    fn user_joined_mentions_name() {
        let decoded = codec(Arc::new(ForbiddenDecryptor))
            .decode(&message(1, "server", "SERVER:0:alice"))
            .unwrap();

        assert!(decoded.is_from_server);
        assert!(decoded.display_text().unwrap().contains("alice"));
        assert!(decoded.attachment().is_none());
        insta::assert_snapshot!(decoded.display_text().unwrap(), @"alice joined the convo.");
    }

    #[test]
    fn metadata_change_lists_fields() {
        let decoded =
            codec(Arc::new(ForbiddenDecryptor)).decode(&message(2, "server", "SERVER:4:5")).unwrap();

        let Some(SystemEvent::MetadataChanged(changes)) = decoded.system_event else {
            panic!("expected metadata event");
        };
        assert!(changes.contains(MetadataChanges::TITLE | MetadataChanges::EXPIRATION));
        insta::assert_snapshot!(
            decoded.display_text().unwrap(),
            @"The convo's title, expiration date changed."
        );
    }

    #[test]
    fn unknown_system_code_is_empty_text() {
        let decoded =
            codec(Arc::new(ForbiddenDecryptor)).decode(&message(3, "server", "SERVER:42:x")).unwrap();
        assert_eq!(decoded.display_text(), Some(""));
    }

    #[test]
    fn malformed_system_message() {
        let err = codec(Arc::new(ForbiddenDecryptor))
            .decode(&message(4, "server", "SERVER:zero:alice"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedSystemMessage { message_id: 4, .. }));
    }

    #[test]
    fn text_payload() {
        let decoded =
            codec(Arc::new(PassthroughDecryptor)).decode(&message(5, "bob", "TEXT=hello")).unwrap();

        assert_eq!(decoded.display_text(), Some("hello"));
        assert!(decoded.attachment().is_none());
        assert!(!decoded.is_own);
        assert!(decoded.system_event.is_none());
    }

    #[test]
    fn file_payload() {
        let decoded = codec(Arc::new(PassthroughDecryptor))
            .decode(&message(6, "me", "FILE=photo.png///BASE64=aGk="))
            .unwrap();

        assert_eq!(decoded.attachment(), Some(("photo.png", b"hi".as_slice())));
        assert!(decoded.display_text().is_none());
        assert!(decoded.is_own);
    }

    #[test]
    fn decryption_failure() {
        let err = codec(Arc::new(PassthroughDecryptor)).decode(&message(7, "bob", "BAD")).unwrap_err();
        assert!(matches!(err, DecodeError::DecryptionFailed { message_id: 7, .. }));
    }

    #[test]
    fn unrecognized_plaintext() {
        let err =
            codec(Arc::new(PassthroughDecryptor)).decode(&message(8, "bob", "hello")).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload { message_id: 8, .. }));
    }

    #[test]
    fn timestamp_converts_to_utc() {
        let decoded =
            codec(Arc::new(PassthroughDecryptor)).decode(&message(9, "bob", "TEXT=x")).unwrap();
        assert_eq!(decoded.timestamp().map(|t| t.timestamp()), Some(1_700_000_009));
    }
}
