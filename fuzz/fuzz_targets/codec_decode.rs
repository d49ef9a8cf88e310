//! Fuzz target for MessageCodec::decode
//!
//! Drives whole raw messages (arbitrary sender, body and timestamp) through
//! the codec with a pass-through decryptor, so both grammars and the
//! localization path see attacker-controlled input.
//!
//! The fuzzer should NEVER panic.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use epistle_core::{DecryptError, Decryptor, EnglishLocalizer, Message, MessageCodec};
use libfuzzer_sys::fuzz_target;

struct Passthrough;

impl Decryptor for Passthrough {
    fn decrypt(&self, body: &str) -> Result<String, DecryptError> {
        Ok(body.to_string())
    }
}

#[derive(Debug, Arbitrary)]
struct RawMessage {
    id: u64,
    sender_id: String,
    timestamp_utc: i64,
    body: String,
}

fuzz_target!(|raw: RawMessage| {
    let codec = MessageCodec::new("me", Arc::new(Passthrough), Arc::new(EnglishLocalizer));
    let message = Message {
        id: raw.id,
        sender_name: raw.sender_id.clone(),
        sender_id: raw.sender_id,
        timestamp_utc: raw.timestamp_utc,
        body: raw.body,
    };

    if let Ok(decoded) = codec.decode(&message) {
        assert_eq!(decoded.id, message.id);
        assert!(decoded.display_text().is_some() != decoded.attachment().is_some());
        let _ = decoded.timestamp();
    }
});
