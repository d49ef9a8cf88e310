//! Decrypted user payload grammar.
//!
//! ```text
//! TEXT=<display text>
//! FILE=<file name>///BASE64=<standard base64 bytes>
//! ```
//!
//! The separator is searched for literally at its first occurrence, so a file
//! name containing `///BASE64=` would be split in the wrong place. Peers do
//! not escape it. [`Payload::encode`] refuses such names so this client never
//! produces an ambiguous payload.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::errors::{ProtocolError, Result};

/// Prefix of a text payload.
pub const TEXT_PREFIX: &str = "TEXT=";

/// Prefix of a file payload.
pub const FILE_PREFIX: &str = "FILE=";

/// Separator between file name and base64 body.
pub const FILE_SEPARATOR: &str = "///BASE64=";

/// User-authored content carried inside an encrypted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Plain text message.
    Text(String),
    /// File attachment.
    File {
        /// Original file name.
        name: String,
        /// Raw file bytes.
        bytes: Vec<u8>,
    },
}

impl Payload {
    /// Parse decrypted plaintext.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` if the plaintext has neither prefix, a file payload
    ///   lacks the separator, or its body is not valid base64.
    pub fn parse(plaintext: &str) -> Result<Self> {
        if let Some(text) = plaintext.strip_prefix(TEXT_PREFIX) {
            return Ok(Self::Text(text.to_string()));
        }

        let Some(file) = plaintext.strip_prefix(FILE_PREFIX) else {
            return Err(ProtocolError::MalformedPayload {
                reason: "missing TEXT= or FILE= prefix".to_string(),
            });
        };

        let Some((name, encoded)) = file.split_once(FILE_SEPARATOR) else {
            return Err(ProtocolError::MalformedPayload {
                reason: format!("file payload without {FILE_SEPARATOR} separator"),
            });
        };

        let bytes = STANDARD.decode(encoded.trim_end()).map_err(|e| {
            ProtocolError::MalformedPayload { reason: format!("attachment base64: {e}") }
        })?;

        Ok(Self::File { name: name.to_string(), bytes })
    }

    /// Encode into the plaintext grammar, ready for encryption.
    ///
    /// # Errors
    ///
    /// - `InvalidFileName` if a file name contains the separator token.
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(format!("{TEXT_PREFIX}{text}")),
            Self::File { name, bytes } => {
                if name.contains(FILE_SEPARATOR) {
                    return Err(ProtocolError::InvalidFileName {
                        name: name.clone(),
                        reason: "contains the base64 separator",
                    });
                }
                Ok(format!("{FILE_PREFIX}{name}{FILE_SEPARATOR}{}", STANDARD.encode(bytes)))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload() {
        assert_eq!(Payload::parse("TEXT=hello"), Ok(Payload::Text("hello".into())));
        assert_eq!(Payload::parse("TEXT="), Ok(Payload::Text(String::new())));
    }

    #[test]
    fn text_keeps_everything_after_prefix() {
        assert_eq!(
            Payload::parse("TEXT=FILE=x///BASE64=aGk="),
            Ok(Payload::Text("FILE=x///BASE64=aGk=".into()))
        );
    }

    #[test]
    fn file_payload() {
        assert_eq!(
            Payload::parse("FILE=photo.png///BASE64=aGk="),
            Ok(Payload::File { name: "photo.png".into(), bytes: b"hi".to_vec() })
        );
    }

    #[test]
    fn first_separator_wins() {
        // Documented ambiguity: the name is cut at the first separator.
        let parsed = Payload::parse("FILE=a///BASE64=b///BASE64=aGk=");
        assert!(matches!(parsed, Err(ProtocolError::MalformedPayload { .. })));
    }

    #[test]
    fn missing_prefix_is_malformed() {
        assert!(matches!(Payload::parse("hello"), Err(ProtocolError::MalformedPayload { .. })));
        assert!(matches!(Payload::parse("text=hello"), Err(ProtocolError::MalformedPayload { .. })));
    }

    #[test]
    fn missing_separator_is_malformed() {
        assert!(matches!(
            Payload::parse("FILE=photo.png"),
            Err(ProtocolError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn bad_base64_is_malformed() {
        assert!(matches!(
            Payload::parse("FILE=a.bin///BASE64=!!!"),
            Err(ProtocolError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn encode_file() {
        let payload = Payload::File { name: "photo.png".into(), bytes: b"hi".to_vec() };
        assert_eq!(payload.encode(), Ok("FILE=photo.png///BASE64=aGk=".to_string()));
    }

    #[test]
    fn encode_rejects_separator_in_name() {
        let payload = Payload::File { name: "a///BASE64=b".into(), bytes: vec![1] };
        assert!(matches!(payload.encode(), Err(ProtocolError::InvalidFileName { .. })));
    }
}
