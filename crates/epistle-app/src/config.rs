//! Controller configuration and errors.

use std::time::Duration;

use epistle_client::FetcherConfig;
use epistle_proto::ProtocolError;
use thiserror::Error;

/// Tunables of one active-conversation controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Messages per backlog or older-history page.
    pub page_size: usize,
    /// Poll interval while the conversation is on screen.
    pub active_interval: Duration,
    /// Poll interval while the conversation is in the background.
    pub passive_interval: Duration,
    /// Metadata refresh period while on screen.
    pub metadata_refresh: Duration,
    /// Deadline after which the loading flag is cleared regardless.
    pub loading_timeout: Duration,
    /// Upper bound on loaded messages after a forward merge.
    pub max_loaded_messages: usize,
    /// Vibration length on new messages.
    pub vibration: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            active_interval: Duration::from_millis(300),
            passive_interval: Duration::from_secs(5),
            metadata_refresh: Duration::from_secs(30),
            loading_timeout: Duration::from_secs(7),
            max_loaded_messages: 50,
            vibration: Duration::from_millis(250),
        }
    }
}

impl ControllerConfig {
    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        let invalid = |reason: &str| Err(ControllerError::InvalidConfig { reason: reason.into() });

        if self.page_size == 0 {
            return invalid("page_size must be positive");
        }
        if self.active_interval.is_zero() || self.passive_interval.is_zero() {
            return invalid("poll intervals must be positive");
        }
        if self.metadata_refresh.is_zero() {
            return invalid("metadata_refresh must be positive");
        }
        if self.max_loaded_messages < self.page_size {
            return invalid("max_loaded_messages must be at least page_size");
        }
        Ok(())
    }

    /// Poll intervals for the fetcher.
    pub fn fetcher(&self) -> FetcherConfig {
        FetcherConfig {
            active_interval: self.active_interval,
            passive_interval: self.passive_interval,
        }
    }
}

/// Errors surfaced by the controller API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Configuration or identity is unusable
    #[error("invalid controller config: {reason}")]
    InvalidConfig {
        /// What was rejected
        reason: String,
    },

    /// No password hash is known for the conversation
    #[error("no password stored for convo {convo_id}")]
    MissingPassword {
        /// Conversation id
        convo_id: String,
    },

    /// Text message was empty or whitespace
    #[error("message is empty")]
    EmptyMessage,

    /// Outbound payload could not be encoded
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ProtocolError),

    /// Controller has shut down
    #[error("controller stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ControllerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.fetcher().active_interval, Duration::from_millis(300));
    }

    #[test]
    fn zero_values_rejected() {
        let zero_page = ControllerConfig { page_size: 0, ..ControllerConfig::default() };
        assert!(zero_page.validate().is_err());

        let zero_poll =
            ControllerConfig { passive_interval: Duration::ZERO, ..ControllerConfig::default() };
        assert!(zero_poll.validate().is_err());

        let tiny_window = ControllerConfig { max_loaded_messages: 5, ..ControllerConfig::default() };
        assert!(tiny_window.validate().is_err());
    }
}
