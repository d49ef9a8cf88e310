//! Polling cadence.

use std::{fmt, time::Duration};

/// Polling speed of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    /// Conversation is on screen.
    Active,
    /// Conversation was left but is still tracked.
    Passive,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Passive => f.write_str("passive"),
        }
    }
}

/// Poll intervals per cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Interval while the conversation is on screen.
    pub active_interval: Duration,
    /// Interval while the conversation is in the background.
    pub passive_interval: Duration,
}

impl FetcherConfig {
    /// Interval for `cadence`.
    pub fn interval(&self, cadence: Cadence) -> Duration {
        match cadence {
            Cadence::Active => self.active_interval,
            Cadence::Passive => self.passive_interval,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(300),
            passive_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_is_slower_by_default() {
        let config = FetcherConfig::default();
        assert!(config.interval(Cadence::Passive) > config.interval(Cadence::Active));
        assert_eq!(Cadence::Active.to_string(), "active");
    }
}
