//! Protocol error types.

use thiserror::Error;

/// Errors produced while parsing or encoding protocol grammars.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Body looked like a server marker but did not follow
    /// `SERVER:<int>:<payload>`.
    #[error("malformed system message: {reason}")]
    MalformedSystemMessage {
        /// What was wrong with the marker
        reason: String,
    },

    /// Decrypted plaintext matched neither `TEXT=` nor `FILE=`.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// What was wrong with the plaintext
        reason: String,
    },

    /// File name cannot be encoded without ambiguity.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName {
        /// Offending file name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
