//! NIP-05 DNS-based identifier resolution (consumed only).
//!
//! `name@domain` resolves through
//! `https://<domain>/.well-known/nostr.json?name=<name>`; a bare domain
//! stands for `_@domain`.  Redirects are never followed.

use std::collections::HashMap;

use nrc_crypto::keys;
use nrc_crypto::nip19::ProfilePointer;
use serde::Deserialize;

use crate::{Error, Result, DEFAULT_ROUND_TRIP};

/// The well-known document: `names` maps local parts to pubkey hex,
/// `relays` maps pubkey hex to relay URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WellKnownResponse {
    pub names: HashMap<String, String>,
    #[serde(default)]
    pub relays: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub nip46: HashMap<String, Vec<String>>,
}

fn is_valid_local(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
}

fn is_valid_domain(domain: &str) -> bool {
    let mut labels = 0;
    for label in domain.split('.') {
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return false;
        }
        labels += 1;
    }
    labels >= 2
}

/// Whether `account` is a syntactically valid identifier
/// (`name@domain` or bare `domain`).
pub fn is_valid_identifier(account: &str) -> bool {
    parse_identifier(account).is_ok()
}

/// Split an identifier into `(name, domain)`; a missing local part becomes
/// `_` per the specification.
pub fn parse_identifier(account: &str) -> Result<(String, String)> {
    let (name, domain) = match account.split_once('@') {
        Some((name, domain)) => (name, domain),
        None => ("_", account),
    };
    if !is_valid_local(name) || !is_valid_domain(domain) {
        return Err(Error::Validation(format!(
            "invalid NIP-05 identifier {account:?}"
        )));
    }
    Ok((name.to_owned(), domain.to_owned()))
}

/// `_@domain` displays as just `domain`.
pub fn normalize_identifier(account: &str) -> &str {
    account.strip_prefix("_@").unwrap_or(account)
}

/// Fetch the well-known document for an identifier.  Returns the document
/// and the resolved local name.
pub async fn fetch(account: &str) -> Result<(WellKnownResponse, String)> {
    let (name, domain) = parse_identifier(account)?;
    let client = reqwest::Client::builder()
        // a redirected well-known document must not be trusted
        .redirect(reqwest::redirect::Policy::none())
        .timeout(DEFAULT_ROUND_TRIP)
        .build()?;
    let response = client
        .get(format!("https://{domain}/.well-known/nostr.json"))
        .query(&[("name", name.as_str())])
        .send()
        .await?
        .json::<WellKnownResponse>()
        .await?;
    Ok((response, name))
}

/// Resolve an identifier to a profile pointer (pubkey plus relay hints).
pub async fn query_identifier(account: &str) -> Result<ProfilePointer> {
    let (response, name) = fetch(account).await?;
    let pubkey_hex = response
        .names
        .get(&name)
        .ok_or_else(|| Error::Validation(format!("no entry for name {name:?}")))?;
    let public_key = keys::parse_public_key(pubkey_hex)
        .map_err(|_| Error::Validation(format!("invalid public key {pubkey_hex:?}")))?;
    let relays = response.relays.get(pubkey_hex).cloned().unwrap_or_default();
    Ok(ProfilePointer { public_key, relays })
}
