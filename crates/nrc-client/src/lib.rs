//! Relay client: one websocket multiplexing many subscriptions.
//!
//! [`Relay`] owns the connection and its three workers (supervisor, writer,
//! reader).  Events are published with OK-ack correlation, subscriptions are
//! demultiplexed by id, and NIP-42 challenge/response authentication rides
//! the same ack path.  See the module docs on [`relay`] for the concurrency
//! contract.
//!
//! Also hosts the NIP-42 helpers ([`auth`]) and the consumed-only HTTP
//! collaborators ([`nip05`], [`nip11`]).

pub mod auth;
pub mod nip05;
pub mod nip11;
mod relay;
mod subscription;

use std::time::Duration;

pub use relay::{normalize_relay_url, Relay, RelayOptions, SubscribeOptions};
pub use subscription::Subscription;

/// Dial and round-trip deadline applied whenever a caller supplies none.
pub const DEFAULT_ROUND_TRIP: Duration = Duration::from_secs(7);

/// Largest inbound frame accepted before the connection is torn down.
pub const DEFAULT_READ_LIMIT: usize = 1024 * 1024;

/// Default capacity of a subscription's event channel.  A subscription that
/// does not drain blocks the reader once this fills; that backpressure is
/// the contract, not a bug.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid relay url {url:?}: {reason}")]
    Url { url: String, reason: String },
    #[error("websocket transport: {0}")]
    Transport(String),
    #[error("dial timed out")]
    DialTimeout,
    #[error("given up waiting for an OK")]
    OkTimeout,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("relay rejected the event: {0}")]
    NegativeAck(String),
    #[error("connection closed: {}", .0.as_deref().unwrap_or("no error recorded"))]
    ConnectionClosed(Option<String>),
    #[error("not connected")]
    NotConnected,
    #[error("relay already connected")]
    AlreadyConnected,
    #[error("relay already closed")]
    AlreadyClosed,
    #[error("{0}")]
    Validation(String),
    #[error("codec: {0}")]
    Codec(#[from] nrc_protocol::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crypto: {0}")]
    Crypto(#[from] nrc_crypto::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
