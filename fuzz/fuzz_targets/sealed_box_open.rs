//! Fuzz target for SealedBoxKey::open
//!
//! Message bodies are untrusted. Arbitrary text must never open under a
//! fixed key and must never panic while being rejected.

#![no_main]

use epistle_core::Decryptor;
use epistle_crypto::SealedBoxKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let key = SealedBoxKey::from_bytes([7u8; 32]);
    assert!(key.open(data).is_err());
    assert!(key.decrypt(data).is_err());
});
