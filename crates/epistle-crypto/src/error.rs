//! Errors for sealed-box operations.

use thiserror::Error;

/// Sealed-box failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Body was not valid base64 or too short to hold a sealed box
    #[error("malformed sealed box: {reason}")]
    MalformedBox {
        /// What was wrong
        reason: String,
    },

    /// Authentication tag did not verify (wrong key or tampered body)
    #[error("decryption failed: authentication failed")]
    AuthenticationFailed,

    /// Key agreement produced an all-zero secret (low-order public key)
    #[error("key agreement rejected: non-contributory public key")]
    WeakPublicKey,

    /// Key material could not be parsed
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// What was wrong
        reason: String,
    },

    /// Envelope has no entry for this key
    #[error("message is not addressed to this key")]
    NotARecipient,

    /// Envelope would have no entries
    #[error("envelope needs at least one recipient")]
    NoRecipients,

    /// Plaintext was not UTF-8
    #[error("plaintext is not UTF-8")]
    NotUtf8,

    /// OS RNG failed
    #[error("random source failed: {reason}")]
    Rng {
        /// RNG detail
        reason: String,
    },
}
