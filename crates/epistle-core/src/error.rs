//! Error types for the Epistle client core.
//!
//! Decode errors are per-message and never fatal to a batch. Service errors
//! come from the remote store and are retried by the polling loops. Store
//! errors come from durable local storage.

use epistle_proto::{MessageId, ProtocolError};
use thiserror::Error;

/// Failure to turn one raw message into a displayable one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Server marker did not follow `SERVER:<int>:<payload>`.
    #[error("message {message_id}: malformed system message: {reason}")]
    MalformedSystemMessage {
        /// Offending message
        message_id: MessageId,
        /// Parser detail
        reason: String,
    },

    /// The decryptor rejected the body.
    #[error("message {message_id}: decryption failed: {reason}")]
    DecryptionFailed {
        /// Offending message
        message_id: MessageId,
        /// Decryptor detail
        reason: String,
    },

    /// Plaintext matched neither `TEXT=` nor `FILE=`.
    #[error("message {message_id}: malformed payload: {reason}")]
    MalformedPayload {
        /// Offending message
        message_id: MessageId,
        /// Parser detail
        reason: String,
    },
}

impl DecodeError {
    /// Id of the message that failed.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::MalformedSystemMessage { message_id, .. }
            | Self::DecryptionFailed { message_id, .. }
            | Self::MalformedPayload { message_id, .. } => *message_id,
        }
    }

    pub(crate) fn from_protocol(message_id: MessageId, err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedSystemMessage { reason } => {
                Self::MalformedSystemMessage { message_id, reason }
            },
            ProtocolError::MalformedPayload { reason } => {
                Self::MalformedPayload { message_id, reason }
            },
            other @ ProtocolError::InvalidFileName { .. } => {
                Self::MalformedPayload { message_id, reason: other.to_string() }
            },
        }
    }
}

/// Error raised by a [`crate::Decryptor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct DecryptError {
    /// What went wrong
    pub reason: String,
}

impl DecryptError {
    /// Create a decrypt error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Errors from the remote conversation store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Request never produced a response (network, timeout)
    #[error("request failed: {reason}")]
    Request {
        /// Transport detail
        reason: String,
    },

    /// Server answered with an unexpected status
    #[error("unexpected status {status}")]
    Status {
        /// HTTP-style status code
        status: u16,
    },

    /// Credentials rejected
    #[error("unauthorized")]
    Unauthorized,

    /// Response body could not be decoded
    #[error("invalid response: {reason}")]
    Decode {
        /// Decoder detail
        reason: String,
    },

    /// Outbound message could not be prepared
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was rejected
        reason: String,
    },
}

impl ServiceError {
    /// Returns true if this error may succeed on retry.
    ///
    /// Network failures and server-side (5xx) statuses are transient.
    /// Rejected credentials and malformed responses are not, although the
    /// polling loop still retries them on its next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status } => *status >= 500 || *status == 429,
            Self::Unauthorized | Self::Decode { .. } | Self::InvalidRequest { .. } => false,
        }
    }
}

/// Errors from durable local storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_server_errors_are_transient() {
        assert!(ServiceError::Request { reason: "reset".into() }.is_transient());
        assert!(ServiceError::Status { status: 503 }.is_transient());
        assert!(ServiceError::Status { status: 429 }.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(!ServiceError::Unauthorized.is_transient());
        assert!(!ServiceError::Status { status: 404 }.is_transient());
        assert!(!ServiceError::Decode { reason: "json".into() }.is_transient());
    }

    #[test]
    fn protocol_errors_keep_message_id() {
        let err = DecodeError::from_protocol(
            9,
            ProtocolError::MalformedPayload { reason: "prefix".into() },
        );
        assert_eq!(err.message_id(), 9);
        assert!(matches!(err, DecodeError::MalformedPayload { .. }));
    }
}
