//! Fuzz target for Payload::parse
//!
//! Arbitrary decrypted plaintext must either parse or return an error. A
//! successful parse must re-encode to a payload that parses to the same value,
//! unless the file name contains the separator (which the encoder refuses).
//!
//! The fuzzer should NEVER panic.

#![no_main]

use epistle_proto::Payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(payload) = Payload::parse(data) else {
        return;
    };

    if let Ok(encoded) = payload.encode() {
        assert_eq!(Payload::parse(&encoded).as_ref(), Ok(&payload));
    }
});
