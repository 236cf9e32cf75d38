//! Subscription handles: opaque printable ids, 1..=64 bytes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// Process-wide counter so generated ids are unique across every relay
/// connection in the program.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// An opaque subscription id as sent in REQ/COUNT/CLOSE and echoed by the
/// relay.  Printable, 1..=64 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub const MAX_LEN: usize = 64;

    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        let printable = id.bytes().all(|b| (0x20..0x7f).contains(&b));
        if id.is_empty() || id.len() > Self::MAX_LEN || !printable {
            return Err(Error::SubscriptionId(id));
        }
        Ok(Self(id))
    }

    /// `label + ':' + counter` from the process-wide monotonic counter.
    pub fn generate(label: &str) -> Self {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let mut id = format!("{label}:{n}");
        // ids are bounded; an oversized label is clipped, the counter kept
        if id.len() > Self::MAX_LEN {
            let tail = format!(":{n}");
            id.truncate(Self::MAX_LEN - tail.len());
            id.push_str(&tail);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SubscriptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SubscriptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        assert!(SubscriptionId::new("a").is_ok());
        assert!(SubscriptionId::new("x".repeat(64)).is_ok());
        assert!(SubscriptionId::new("").is_err());
        assert!(SubscriptionId::new("x".repeat(65)).is_err());
        assert!(SubscriptionId::new("new\nline").is_err());
    }

    #[test]
    fn generate_is_monotonic_and_labeled() {
        let a = SubscriptionId::generate("sub");
        let b = SubscriptionId::generate("sub");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sub:"));

        let (_, na) = a.as_str().split_once(':').unwrap();
        let (_, nb) = b.as_str().split_once(':').unwrap();
        assert!(nb.parse::<u64>().unwrap() > na.parse::<u64>().unwrap());
    }

    #[test]
    fn generate_clips_oversized_labels() {
        let id = SubscriptionId::generate(&"L".repeat(100));
        assert!(id.as_str().len() <= SubscriptionId::MAX_LEN);
        assert!(id.as_str().contains(':'));
    }

    #[test]
    fn empty_label_yields_colon_counter() {
        let id = SubscriptionId::generate("");
        assert!(id.as_str().starts_with(':'));
    }
}
