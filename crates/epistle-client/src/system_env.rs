//! Production Environment implementation on tokio's clock.
//!
//! Uses `tokio::time::Instant` rather than `std::time::Instant` so that the
//! same environment runs unchanged under `#[tokio::test(start_paused = true)]`:
//! sleeps then advance virtual time and tests stay deterministic.

use std::time::Duration;

use epistle_core::env::Environment;

/// Production environment using tokio time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_time() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_secs(5)).await;

        assert!(env.now() - start >= Duration::from_secs(5));
    }
}
