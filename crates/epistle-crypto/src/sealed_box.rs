//! Anonymous sealed boxes over X25519 + `XChaCha20-Poly1305`.
//!
//! Layout of the decoded body:
//! - bytes 0-31: ephemeral X25519 public key
//! - bytes 32-55: `XChaCha20` nonce
//! - bytes 56..: ciphertext including the 16-byte Poly1305 tag

use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as DalekPublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{error::CryptoError, key::PublicKey};

/// Label bound into every derived key
const SEAL_LABEL: &[u8] = b"epistleSealV1";

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

const KEY_SIZE: usize = 32;

const TAG_SIZE: usize = 16;

/// Bytes a sealed box adds on top of the plaintext (before base64).
pub const SEALED_OVERHEAD: usize = KEY_SIZE + NONCE_SIZE + TAG_SIZE;

/// Seal `plaintext` for `recipient`.
///
/// Pure: `ephemeral_secret` and `nonce` must come from a cryptographically
/// secure source in production. Returns the base64 body.
///
/// # Errors
///
/// - `WeakPublicKey` if `recipient` is a low-order point
pub fn seal(
    recipient: &PublicKey,
    plaintext: &[u8],
    ephemeral_secret: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Result<String, CryptoError> {
    let ephemeral = StaticSecret::from(ephemeral_secret);
    let ephemeral_public = DalekPublicKey::from(&ephemeral);
    let recipient_key = DalekPublicKey::from(*recipient.as_bytes());

    let shared = ephemeral.diffie_hellman(&recipient_key);
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }
    let key = derive_box_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());

    let cipher = XChaCha20Poly1305::new((&*key).into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut body = Vec::with_capacity(SEALED_OVERHEAD + plaintext.len());
    body.extend_from_slice(ephemeral_public.as_bytes());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(body))
}

/// Seal `plaintext` for `recipient` with a fresh ephemeral key and nonce.
///
/// # Errors
///
/// - `Rng` if the OS random source fails
/// - `WeakPublicKey` if `recipient` is a low-order point
pub fn seal_random(recipient: &PublicKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let mut ephemeral = Zeroizing::new([0u8; KEY_SIZE]);
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::fill(ephemeral.as_mut_slice())
        .and_then(|()| getrandom::fill(&mut nonce))
        .map_err(|e| CryptoError::Rng { reason: e.to_string() })?;

    seal(recipient, plaintext, *ephemeral, nonce)
}

/// Open a base64 sealed box with the recipient's secret.
pub(crate) fn open(
    secret: &StaticSecret,
    recipient: &PublicKey,
    body: &str,
) -> Result<Vec<u8>, CryptoError> {
    let raw = STANDARD
        .decode(body.trim())
        .map_err(|e| CryptoError::MalformedBox { reason: e.to_string() })?;
    if raw.len() < SEALED_OVERHEAD {
        return Err(CryptoError::MalformedBox {
            reason: format!("{} bytes, need at least {SEALED_OVERHEAD}", raw.len()),
        });
    }

    let (ephemeral_bytes, rest) = raw.split_at(KEY_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut ephemeral = [0u8; KEY_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let shared = secret.diffie_hellman(&DalekPublicKey::from(ephemeral));
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }
    let key = derive_box_key(shared.as_bytes(), &ephemeral, recipient.as_bytes());

    let cipher = XChaCha20Poly1305::new((&*key).into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Derive the AEAD key from the shared secret.
///
/// Both public keys are bound into the info parameter so a box cannot be
/// replayed to another recipient under the same shared secret.
fn derive_box_key(
    shared: &[u8; KEY_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
) -> Zeroizing<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, shared);

    // label || eph_pk || recipient_pk
    let mut info = Vec::with_capacity(SEAL_LABEL.len() + 2 * KEY_SIZE);
    info.extend_from_slice(SEAL_LABEL);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    let Ok(()) = hkdf.expand(&info, key.as_mut_slice()) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SealedBoxKey;

    fn recipient() -> SealedBoxKey {
        SealedBoxKey::from_bytes([7u8; KEY_SIZE])
    }

    #[test]
    fn seal_then_open() {
        let key = recipient();
        let body = seal(&key.public_key(), b"TEXT=hello", [1u8; 32], [2u8; 24]).unwrap();

        assert_eq!(key.open(&body).unwrap(), b"TEXT=hello");
    }

    #[test]
    fn seal_is_deterministic_for_fixed_randomness() {
        let public = recipient().public_key();
        let a = seal(&public, b"x", [1u8; 32], [2u8; 24]).unwrap();
        let b = seal(&public, b"x", [1u8; 32], [2u8; 24]).unwrap();
        let c = seal(&public, b"x", [1u8; 32], [3u8; 24]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let body = seal(&recipient().public_key(), b"secret", [1u8; 32], [2u8; 24]).unwrap();
        let other = SealedBoxKey::from_bytes([9u8; KEY_SIZE]);

        assert_eq!(other.open(&body), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn tampered_body_fails_authentication() {
        let key = recipient();
        let body = seal(&key.public_key(), b"secret", [1u8; 32], [2u8; 24]).unwrap();
        let mut raw = STANDARD.decode(&body).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        assert_eq!(key.open(&STANDARD.encode(raw)), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn short_body_is_malformed() {
        let body = STANDARD.encode([0u8; SEALED_OVERHEAD - 1]);
        assert!(matches!(recipient().open(&body), Err(CryptoError::MalformedBox { .. })));
    }

    #[test]
    fn non_base64_is_malformed() {
        assert!(matches!(recipient().open("not base64!"), Err(CryptoError::MalformedBox { .. })));
    }

    #[test]
    fn low_order_recipient_rejected() {
        let zero = PublicKey::from_bytes([0u8; KEY_SIZE]);
        assert_eq!(seal(&zero, b"x", [1u8; 32], [2u8; 24]), Err(CryptoError::WeakPublicKey));
    }

    #[test]
    fn random_seal_opens() {
        let key = recipient();
        let body = seal_random(&key.public_key(), b"TEXT=hi").unwrap();
        assert_eq!(key.open(&body).unwrap(), b"TEXT=hi");
    }
}
