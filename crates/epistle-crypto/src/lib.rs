//! Epistle sealed-box encryption
//!
//! Every message body is encrypted once per recipient with an anonymous
//! sealed box: the sender generates an ephemeral X25519 key, agrees a shared
//! secret with the recipient's public key, derives an AEAD key with HKDF and
//! encrypts with `XChaCha20-Poly1305`.
//!
//! ```text
//! ephemeral secret ──X25519──▶ shared secret
//!                                   │
//!                                   ▼
//!           HKDF-SHA256(info = label ‖ eph_pk ‖ recipient_pk)
//!                                   │
//!                                   ▼
//!                    XChaCha20-Poly1305(nonce) ──▶ ciphertext
//!
//! body = base64(eph_pk ‖ nonce ‖ ciphertext)
//! ```
//!
//! A posted message carries one box per participant in a JSON envelope keyed
//! by public key ([`seal_envelope`]). [`SealedBoxKey::open`] accepts either
//! form.
//!
//! [`seal`] is pure: the caller supplies the ephemeral secret and nonce.
//! [`seal_random`] draws both from the OS RNG.
//!
//! The private key is kept in [`SealedBoxKey`], which implements
//! [`epistle_core::Decryptor`] so the codec can use it directly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod key;
mod sealed_box;

pub use envelope::seal_envelope;
pub use error::CryptoError;
pub use key::{PEM_FOOTER, PEM_HEADER, PublicKey, SealedBoxKey};
pub use sealed_box::{NONCE_SIZE, SEALED_OVERHEAD, seal, seal_random};
