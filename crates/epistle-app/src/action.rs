//! Conversation side-effects.
//!
//! This module defines the [`ConvoAction`] enum, the instructions produced by
//! the [`crate::Conversation`] state machine for the coordinator to execute.

use epistle_client::Cadence;
use epistle_core::MessageId;

use crate::ConvoNotification;

/// Actions produced by the Conversation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvoAction {
    /// Request the most recent page.
    FetchBacklog {
        /// Page size.
        count: usize,
    },

    /// Request the page before `before_id`.
    FetchOlder {
        /// Exclusive upper bound.
        before_id: MessageId,
        /// Page size.
        count: usize,
    },

    /// (Re)start forward polling. Replaces any running loop.
    StartPolling {
        /// Poll speed.
        cadence: Cadence,
        /// Cursor to resume from, unless the coordinator has seen further.
        from: MessageId,
    },

    /// Stop forward polling.
    StopPolling,

    /// Start the periodic metadata refresh, unless already running.
    StartMetadataRefresh,

    /// Stop the periodic metadata refresh.
    StopMetadataRefresh,

    /// Arm the loading safety deadline.
    ScheduleLoadingTimeout,

    /// Record `id` as last seen.
    PersistLastSeen {
        /// Message id.
        id: MessageId,
    },

    /// New messages from others arrived: vibrate or notify per platform rules.
    Alert {
        /// Number of new foreign messages.
        count: usize,
    },

    /// Publish an event to subscribers.
    Notify(ConvoNotification),

    /// Republish the view.
    Publish,
}
