//! Client
//!
//! Forward polling for one open conversation. A [`MessageFetcher`] spawns a
//! loop that repeatedly asks the conversation store for messages after a
//! cursor and hands each non-empty batch to a callback. The loop survives
//! every request failure; only cancelling its [`FetchHandle`] stops it.
//!
//! # Components
//!
//! - [`MessageFetcher`]: starts and retargets polling loops
//! - [`FetchHandle`]: cancellation scope of one running loop
//! - [`Cadence`] / [`FetcherConfig`]: active and passive poll intervals
//! - [`SystemEnv`]: production [`Environment`] on tokio's clock
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::HttpConvoService`], a JSON-over-HTTP implementation of the
//! conversation store and message sender.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod fetcher;
mod system_env;

#[cfg(feature = "transport")]
pub mod transport;

pub use config::{Cadence, FetcherConfig};
pub use epistle_core::env::Environment;
pub use fetcher::{FetchCallback, FetchHandle, MessageFetcher};
pub use system_env::SystemEnv;
