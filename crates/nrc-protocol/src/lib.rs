//! Nostr wire protocol: events, filters, envelopes and subscription ids.
//!
//! Everything a relay and a client exchange is a single JSON array per text
//! frame whose first element is a tag string (`EVENT`, `REQ`, `OK`, …).  The
//! enums in [`envelope`] map 1:1 to those frames; [`event`] and [`filter`]
//! carry the canonical byte forms that event ids and filter fingerprints are
//! hashed from.

pub mod envelope;
pub mod event;
pub mod filter;
pub mod subscription_id;
pub mod tag;

pub use envelope::{ClientMessage, RelayMessage};
pub use event::{Event, EventId, Kind, PubKey, Sig, Timestamp, Verification};
pub use filter::{Filter, Filters};
pub use subscription_id::SubscriptionId;
pub use tag::{Tag, Tags};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {field} length: want {want} bytes, got {got}")]
    FieldLength {
        field: &'static str,
        want: usize,
        got: usize,
    },
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("subscription id must be 1..=64 printable bytes, got {0:?}")]
    SubscriptionId(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crypto: {0}")]
    Crypto(#[from] nrc_crypto::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
