//! NIP-11 relay information fetch (consumed only).
//!
//! A relay's `http(s)` endpoint answers a GET carrying
//! `Accept: application/nostr+json` with an info document.  The document
//! shape is caller-defined; [`RelayInformation`] covers the common fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::relay::normalize_relay_url;
use crate::{Result, DEFAULT_ROUND_TRIP};

/// The common fields of a relay info document.  Fetch into a custom type
/// with [`fetch_into`] when more is needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayInformation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pubkey: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub supported_nips: Option<Vec<u16>>,
    #[serde(default)]
    pub software: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Fetch a relay's info document into any deserializable type.
pub async fn fetch_into<T: DeserializeOwned>(relay_url: &str) -> Result<T> {
    let ws_url = normalize_relay_url(relay_url)?;
    let http_url = match ws_url.strip_prefix("wss://") {
        Some(rest) => format!("https://{rest}"),
        None => format!("http://{}", ws_url.trim_start_matches("ws://")),
    };
    let client = reqwest::Client::builder()
        .timeout(DEFAULT_ROUND_TRIP)
        .build()?;
    let info = client
        .get(http_url)
        .header("Accept", "application/nostr+json")
        .send()
        .await?
        .json::<T>()
        .await?;
    Ok(info)
}

/// Fetch a relay's info document as [`RelayInformation`].
pub async fn fetch(relay_url: &str) -> Result<RelayInformation> {
    fetch_into(relay_url).await
}
