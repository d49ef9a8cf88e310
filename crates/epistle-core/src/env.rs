//! Environment abstraction for deterministic testing.
//!
//! Decouples polling and timeout logic from the wall clock. Production uses
//! tokio's timer; tests run the same loops on tokio's paused clock.

use std::time::Duration;

/// Abstract environment providing time and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `sleep()` completes no earlier than `duration` after it is polled
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only loop drivers call this. State machines never sleep.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
