//! Epistle client core
//!
//! Sans-IO building blocks for the active-conversation pipeline: decoding raw
//! messages, keeping the ordered per-conversation sequence, and the traits
//! through which every external collaborator (conversation store, password
//! lookup, last-seen persistence, decryption, localization) is injected.
//!
//! # Components
//!
//! - [`codec::MessageCodec`]: one raw message in, one decoded message (or a
//!   [`DecodeError`]) out
//! - [`session::ConversationSession`]: ordered, deduplicated message sequence
//!   and tail cursor
//! - [`service`]: black-box collaborator traits
//! - [`env::Environment`]: time abstraction so loops can run on virtual time

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod env;
pub mod error;
pub mod localization;
pub mod service;
pub mod session;

pub use codec::{Content, DecodedMessage, MessageCodec};
pub use env::Environment;
pub use error::{DecodeError, DecryptError, ServiceError, StoreError};
pub use localization::{EnglishLocalizer, Localizer};
pub use service::{
    AuthTokenSource, ConvoAccess, ConvoService, Decryptor, LastSeenStore, MemoryLastSeenStore,
    MemoryPasswordStore, MessageSender, PasswordStore, StaticAuthToken,
};
pub use session::{ConversationSession, MergeOutcome};

pub use epistle_proto::{ConvoId, ConvoMetadata, Message, MessageId};
