//! Fuzz target for SystemMessage::parse and event interpretation
//!
//! Server markers come from the network unauthenticated. Any string must
//! parse or fail cleanly, and any parsed marker must map to an event or an
//! error.
//!
//! The fuzzer should NEVER panic.

#![no_main]

use epistle_proto::SystemMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    for body in [data.to_string(), format!("SERVER:{data}")] {
        if let Ok(message) = SystemMessage::parse(&body) {
            let _ = message.event();
        }
    }
});
