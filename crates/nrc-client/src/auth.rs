//! NIP-42 challenge/response helpers.
//!
//! A relay proves a client holds its key by sending a challenge; the client
//! answers with a signed kind-22242 event carrying `relay` and `challenge`
//! tags.  [`validate`] is the server-side check, used here to verify our own
//! responses in tests and exposed for relay implementations built on this
//! crate's codec.

use std::time::Duration;

use bech32::{Bech32, Hrp};
use nrc_protocol::{Event, Kind, Tag, Tags, Timestamp};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{Error, Result};

/// Human-readable prefix of a generated challenge.
pub const CHALLENGE_HRP: &str = "nchal";
/// Entropy bytes behind a challenge.
pub const CHALLENGE_LENGTH: usize = 16;

/// Accepted clock skew between the auth event and now.
const MAX_CREATED_AT_SKEW: Duration = Duration::from_secs(10 * 60);

const RELAY_TAG: &str = "relay";
const CHALLENGE_TAG: &str = "challenge";

/// Generate a fresh challenge: 16 uniform random bytes, bech32-encoded with
/// the `nchal` prefix.
pub fn generate_challenge() -> Result<String> {
    let mut entropy = [0u8; CHALLENGE_LENGTH];
    OsRng.fill_bytes(&mut entropy);
    let hrp = Hrp::parse(CHALLENGE_HRP).map_err(|e| Error::Validation(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, &entropy).map_err(|e| Error::Validation(e.to_string()))
}

/// Build the unsigned kind-22242 event answering `challenge` for
/// `relay_url`.  Sign it and send it in an AUTH envelope.
pub fn create_unsigned(relay_url: &str, challenge: &str) -> Event {
    Event::unsigned(
        Timestamp::now(),
        Kind::CLIENT_AUTHENTICATION,
        Tags::new([
            Tag::new([RELAY_TAG, relay_url]),
            Tag::new([CHALLENGE_TAG, challenge]),
        ]),
        "",
    )
}

fn parse_url(input: &str) -> Result<url::Url> {
    let lowered = input.to_lowercase();
    url::Url::parse(lowered.trim_end_matches('/')).map_err(|e| Error::Url {
        url: input.to_owned(),
        reason: e.to_string(),
    })
}

/// Check that `event` is a valid response to `challenge` issued for
/// `relay_url`: kind 22242, matching challenge tag, relay tag agreeing on
/// scheme/host/path, created_at within ±10 minutes, valid signature.
pub fn validate(event: &Event, challenge: &str, relay_url: &str) -> Result<()> {
    if event.kind != Kind::CLIENT_AUTHENTICATION {
        return Err(Error::Validation(format!(
            "wrong kind for an auth event: {}",
            event.kind.as_u16()
        )));
    }
    if !event.tags.contains_any(CHALLENGE_TAG, &[challenge]) {
        return Err(Error::Validation(
            "challenge tag missing or mismatched".into(),
        ));
    }
    let relay_tag = event
        .tags
        .first_by_name(RELAY_TAG)
        .and_then(Tag::value)
        .ok_or_else(|| Error::Validation("relay tag missing".into()))?;
    let expected = parse_url(relay_url)?;
    let found = parse_url(relay_tag)?;
    if expected.scheme() != found.scheme()
        || expected.host_str() != found.host_str()
        || expected.path() != found.path()
    {
        return Err(Error::Validation(format!(
            "relay tag {found} does not match {expected}"
        )));
    }
    let skew = (Timestamp::now().as_i64() - event.created_at.as_i64()).unsigned_abs();
    if skew > MAX_CREATED_AT_SKEW.as_secs() {
        return Err(Error::Validation(
            "auth event is more than 10 minutes from the current time".into(),
        ));
    }
    // most expensive check last
    if !event.verify()?.is_valid() {
        return Err(Error::Validation("invalid signature".into()));
    }
    Ok(())
}
