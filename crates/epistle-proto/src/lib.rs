//! Epistle protocol records and grammars.
//!
//! The conversation store hands out immutable [`Message`] records. A message
//! body is one of two things:
//!
//! - A server-authored marker, `SERVER:<type>:<payload>`, parsed by
//!   [`SystemMessage::parse`].
//! - An encrypted blob which, once decrypted, follows the payload grammar
//!   `TEXT=<text>` or `FILE=<name>///BASE64=<base64>`, parsed by
//!   [`Payload::parse`].
//!
//! Both grammars are bit-exact with the server and crypto layers. This crate
//! only parses and encodes; it never decrypts and never performs I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod message;
mod metadata;
mod payload;
mod system;

pub use errors::{ProtocolError, Result};
pub use message::{ConvoId, Message, MessageId, SERVER_MARKER};
pub use metadata::ConvoMetadata;
pub use payload::{FILE_PREFIX, FILE_SEPARATOR, Payload, TEXT_PREFIX};
pub use system::{MetadataChanges, SystemEvent, SystemMessage};
