//! Deterministic simulation harness for Epistle conversation sync.
//!
//! In-memory implementations of the service, sender and platform seams, so
//! controllers run end to end on tokio's paused clock with reproducible
//! failure injection.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of published views that must
//! hold on every path: ordering, deduplication, tail monotonicity and a
//! single poll loop at the right cadence. Use [`InvariantRegistry::standard()`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod platform;
pub mod rig;
pub mod sim_server;

pub use invariants::{
    CadenceMatchesState, ConvoSnapshot, Invariant, InvariantRegistry, InvariantResult,
    NoDuplicateIds, SortedByTimestamp, SystemSnapshot, TailIsMaxId, TailMonotonic, Violation,
};
pub use platform::{CORRUPT_PREFIX, PlainDecryptor, RecordingPlatform, ShownNotification};
pub use rig::SimRig;
pub use sim_server::{RequestCounts, SentMessage, SimServer};
