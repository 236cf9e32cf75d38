//! Client library for the nostr relay protocol over text-framed websockets.
//!
//! The workspace splits along the protocol seams:
//!
//! - [`nrc_protocol`]: events (canonical id hashing, sign/verify), tags,
//!   filters (matching + fingerprints), envelopes and subscription ids;
//! - [`nrc_crypto`]: the Schnorr/secp256k1 [`Signer`](nrc_crypto::Signer)
//!   backends, NIP-19 bech32 identifiers and key helpers;
//! - [`nrc_client`]: the concurrent [`Relay`] runtime (publish with OK
//!   correlation, subscriptions, COUNT, NIP-42 auth) plus the NIP-05 and
//!   NIP-11 HTTP collaborators.
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_relay_client::{Relay, RelayOptions, Filters, Filter, SubscribeOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let relay = Relay::connect_to("wss://relay.example.com", RelayOptions::new()).await?;
//!
//! let mut filter = Filter::new();
//! filter.kinds = vec![nostr_relay_client::Kind::TEXT_NOTE];
//! filter.limit = Some(10);
//!
//! let mut sub = relay
//!     .subscribe(Filters::single(filter), SubscribeOptions::default())
//!     .await?;
//! while let Some(event) = sub.events.recv().await {
//!     println!("{}: {}", event.id, event.content);
//! }
//! # Ok(())
//! # }
//! ```

pub use nrc_client::{
    auth, nip05, nip11, normalize_relay_url, Error, Relay, RelayOptions, SubscribeOptions,
    Subscription, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_READ_LIMIT, DEFAULT_ROUND_TRIP,
};
pub use nrc_crypto::{keys, nip19, DefaultSigner, Signer};
pub use nrc_protocol::{
    ClientMessage, Event, EventId, Filter, Filters, Kind, PubKey, RelayMessage, Sig,
    SubscriptionId, Tag, Tags, Timestamp, Verification,
};
