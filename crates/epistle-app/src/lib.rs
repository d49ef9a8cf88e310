//! Active-conversation layer for Epistle clients
//!
//! Pure state machine plus an async coordinator that drives it against the
//! conversation service, keeping one open conversation in sync.
//!
//! # Components
//!
//! - [`Conversation`]: lifecycle, merge and cadence decisions (no I/O)
//! - [`ActiveConversationController`]: coordinator owning the poll loop,
//!   metadata refresh, decode fan-out and the serialized sender
//! - [`ControllerHandle`]: cloneable command surface for frontends
//! - [`Platform`]: device services for vibration and notifications

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod config;
mod controller;
mod conversation;
mod event;
mod platform;
mod state;

pub use action::ConvoAction;
pub use config::{ControllerConfig, ControllerError};
pub use controller::{ActiveConversationController, ControllerDeps, ControllerHandle};
pub use conversation::Conversation;
pub use event::ConvoEvent;
pub use platform::{AlertDecision, Platform, UserSettings, decide_alert};
pub use state::{ConversationView, ConvoNotification, ConvoState};
