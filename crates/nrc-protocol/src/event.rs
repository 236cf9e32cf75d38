//! The signed event: canonical id hashing, BIP-340 sign/verify, strict serde.
//!
//! The id is the sha256 of the canonical serialization
//! `[0,"<pubkey_hex>",<created_at>,<kind>,<tags>,"<content>"]`, minified
//! JSON with no inter-element whitespace.  The wire form is the JSON object
//! `{id,pubkey,created_at,kind,tags,content,sig}` with lowercase hex fields
//! and strict length checks on decode.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use nrc_crypto::Signer;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::tag::Tags;
use crate::{Error, Result};

/// Seconds since the Unix epoch, signed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(secs: i64) -> Self {
        Self(secs)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self(secs)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

/// Event kind, a 16-bit discriminant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Kind(u16);

impl Kind {
    pub const TEXT_NOTE: Kind = Kind(1);
    /// NIP-42 client authentication.
    pub const CLIENT_AUTHENTICATION: Kind = Kind(22242);

    pub fn new(kind: u16) -> Self {
        Self(kind)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }
}

macro_rules! hex_array {
    ($name:ident, $len:expr, $field:literal) => {
        /// Fixed-size binary field carried as lowercase hex on the wire.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                if bytes.len() != $len {
                    return Err(Error::FieldLength {
                        field: $field,
                        want: $len,
                        got: bytes.len(),
                    });
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            pub fn from_hex(s: &str) -> Result<Self> {
                Self::from_slice(&hex::decode(s)?)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(D::Error::custom)
            }
        }
    };
}

hex_array!(EventId, 32, "id");
hex_array!(PubKey, 32, "pubkey");
hex_array!(Sig, 64, "sig");

/// Outcome of [`Event::verify`].
///
/// `ValidWrongId` is the recovery diagnostic: the signature verifies against
/// the id recomputed from the event body, but the carried id is wrong and
/// cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    ValidWrongId { correct: EventId },
    Invalid,
}

impl Verification {
    /// Whether the signature checks out against the event body.
    pub fn is_valid(self) -> bool {
        !matches!(self, Verification::Invalid)
    }
}

/// A signed nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: PubKey,
    pub created_at: Timestamp,
    pub kind: Kind,
    pub tags: Tags,
    pub content: String,
    pub sig: Sig,
}

impl Event {
    /// An event awaiting [`Event::sign`]; id, pubkey and sig are zeroed.
    pub fn unsigned(
        created_at: Timestamp,
        kind: Kind,
        tags: Tags,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::default(),
            pubkey: PubKey::default(),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: Sig::default(),
        }
    }

    /// The canonical byte form the id is hashed from.
    pub fn canonical(&self) -> Result<Vec<u8>> {
        // A tuple serializes as a JSON array; serde_json's compact escaping
        // is exactly the wire escape set.
        let canonical = (
            0u8,
            self.pubkey.to_hex(),
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// `sha256(canonical)`.
    pub fn compute_id(&self) -> Result<EventId> {
        let digest = Sha256::digest(self.canonical()?);
        Ok(EventId(digest.into()))
    }

    /// Set pubkey from the signer, compute the id, and sign it.
    pub fn sign<S: Signer>(&mut self, signer: &S) -> Result<()> {
        self.pubkey = PubKey(signer.pub_key()?);
        self.id = self.compute_id()?;
        self.sig = Sig(signer.sign(self.id.as_bytes())?);
        Ok(())
    }

    /// Verify the signature against the carried id and pubkey.
    ///
    /// When that fails, the id is recomputed from the body and verification
    /// is retried once; see [`Verification::ValidWrongId`].
    pub fn verify(&self) -> Result<Verification> {
        if nrc_crypto::verify(self.pubkey.as_bytes(), self.id.as_bytes(), self.sig.as_bytes())? {
            return Ok(Verification::Valid);
        }
        let correct = self.compute_id()?;
        if correct != self.id
            && nrc_crypto::verify(self.pubkey.as_bytes(), correct.as_bytes(), self.sig.as_bytes())?
        {
            return Ok(Verification::ValidWrongId { correct });
        }
        Ok(Verification::Invalid)
    }
}
