//! Multi-recipient message bodies.
//!
//! A posted message is sealed once per participant and stored as one JSON
//! object keyed by each recipient's base64 public key:
//!
//! ```text
//! {"<recipient public key>": "<sealed box>", ...}
//! ```
//!
//! A recipient picks its own entry by public key, so decryption never needs
//! to know user ids. Bodies that are not an object are treated as a single
//! bare sealed box.

use std::collections::BTreeMap;

use crate::{error::CryptoError, key::PublicKey, sealed_box::seal_random};

/// Seal `plaintext` for every key in `recipients` into one envelope.
///
/// # Errors
///
/// - `NoRecipients` if `recipients` is empty
/// - `Rng` or `WeakPublicKey` from sealing an entry
pub fn seal_envelope(recipients: &[PublicKey], plaintext: &[u8]) -> Result<String, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let mut boxes = BTreeMap::new();
    for recipient in recipients {
        boxes.insert(recipient.to_base64(), seal_random(recipient, plaintext)?);
    }
    serde_json::to_string(&boxes).map_err(|e| CryptoError::MalformedBox { reason: e.to_string() })
}

/// The sealed box addressed to `own` if `body` is an envelope.
///
/// `Ok(None)` means `body` is not an envelope and should be opened as is.
pub(crate) fn entry_for(body: &str, own: &PublicKey) -> Result<Option<String>, CryptoError> {
    if !body.trim_start().starts_with('{') {
        return Ok(None);
    }

    let mut boxes: BTreeMap<String, String> = serde_json::from_str(body)
        .map_err(|e| CryptoError::MalformedBox { reason: format!("envelope: {e}") })?;
    boxes.remove(&own.to_base64()).map(Some).ok_or(CryptoError::NotARecipient)
}
