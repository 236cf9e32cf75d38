//! Query filters: match predicate, canonical-order marshal, fingerprint.
//!
//! Filter JSON is canonicalized so that the same *set* of fields produces
//! identical bytes no matter the order elements were supplied in: fields are
//! emitted in the fixed order `{ids, kinds, authors, #x…, since, until,
//! search, limit}` and every set is sorted.  That makes the fingerprint a
//! stable identity for deduplicating effectively-identical queries.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::event::{Event, EventId, Kind, PubKey, Timestamp};
use crate::Result;

/// A single subscription query.  An event matches iff every populated field
/// is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub ids: Vec<EventId>,
    pub kinds: Vec<Kind>,
    pub authors: Vec<PubKey>,
    /// Tag-value sets keyed by tag name (wire keys carry a `#` prefix).
    /// `e` and `p` values must be 64-char hex.
    pub tags: BTreeMap<String, Vec<String>>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    pub search: Option<String>,
    pub limit: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `ev` satisfies every populated field.
    pub fn matches(&self, ev: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&ev.id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&ev.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&ev.pubkey) {
            return false;
        }
        for (name, values) in &self.tags {
            if !ev.tags.contains_any(name, values) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if ev.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ev.created_at > until {
                return false;
            }
        }
        true
    }

    /// 64-bit identity of the canonical marshal with `limit` zeroed.
    ///
    /// Stable under permutation of the input sets.
    pub fn fingerprint(&self) -> Result<u64> {
        let mut probe = self.clone();
        probe.limit = None;
        let bytes = serde_json::to_vec(&probe)?;
        let digest = Sha256::digest(&bytes);
        let mut first8 = [0u8; 8];
        first8.copy_from_slice(&digest[..8]);
        Ok(u64::from_le_bytes(first8))
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.ids.is_empty() {
            let mut ids: Vec<String> = self.ids.iter().map(EventId::to_hex).collect();
            ids.sort_unstable();
            map.serialize_entry("ids", &ids)?;
        }
        if !self.kinds.is_empty() {
            let mut kinds: Vec<u16> = self.kinds.iter().map(|k| k.as_u16()).collect();
            kinds.sort_unstable();
            map.serialize_entry("kinds", &kinds)?;
        }
        if !self.authors.is_empty() {
            let mut authors: Vec<String> = self.authors.iter().map(PubKey::to_hex).collect();
            authors.sort_unstable();
            map.serialize_entry("authors", &authors)?;
        }
        // BTreeMap iteration gives tag names in sorted order
        for (name, values) in &self.tags {
            let mut values = values.clone();
            values.sort_unstable();
            map.serialize_entry(&format!("#{name}"), &values)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(search) = &self.search {
            map.serialize_entry("search", search)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FilterVisitor)
    }
}

struct FilterVisitor;

impl<'de> Visitor<'de> for FilterVisitor {
    type Value = Filter;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a filter object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Filter, A::Error> {
        let mut filter = Filter::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "ids" => {
                    let raw: Vec<String> = map.next_value()?;
                    filter.ids = raw
                        .iter()
                        .map(|s| EventId::from_hex(s))
                        .collect::<Result<_>>()
                        .map_err(de::Error::custom)?;
                }
                "kinds" => {
                    let raw: Vec<u16> = map.next_value()?;
                    filter.kinds = raw.into_iter().map(Kind::new).collect();
                }
                "authors" => {
                    let raw: Vec<String> = map.next_value()?;
                    filter.authors = raw
                        .iter()
                        .map(|s| PubKey::from_hex(s))
                        .collect::<Result<_>>()
                        .map_err(de::Error::custom)?;
                }
                "since" => filter.since = Some(map.next_value()?),
                "until" => filter.until = Some(map.next_value()?),
                "search" => filter.search = Some(map.next_value()?),
                "limit" => filter.limit = Some(map.next_value()?),
                tag_key if tag_key.starts_with('#') && tag_key.len() > 1 => {
                    let name = tag_key[1..].to_owned();
                    let values: Vec<String> = map.next_value()?;
                    if name == "e" || name == "p" {
                        // these reference ids and keys and must be 32-byte hex
                        for v in &values {
                            EventId::from_hex(v).map_err(|_| {
                                de::Error::custom(format!(
                                    "#{name} value {v:?} is not 64 hex characters"
                                ))
                            })?;
                        }
                    }
                    filter.tags.insert(name, values);
                }
                other => {
                    return Err(de::Error::unknown_field(
                        other,
                        &[
                            "ids", "kinds", "authors", "#<tag>", "since", "until", "search",
                            "limit",
                        ],
                    ));
                }
            }
        }
        Ok(filter)
    }
}

/// One or more filters fired under a single subscription; an event matches
/// when any filter matches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filters(pub Vec<Filter>);

impl Filters {
    pub fn new(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self(filters.into_iter().collect())
    }

    pub fn single(filter: Filter) -> Self {
        Self(vec![filter])
    }

    pub fn matches(&self, ev: &Event) -> bool {
        self.0.iter().any(|f| f.matches(ev))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Tag, Tags};

    fn hexkey(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    fn event_with(kind: u16, created_at: i64, tags: Tags) -> Event {
        Event {
            id: EventId([0x11; 32]),
            pubkey: PubKey([0xaa; 32]),
            created_at: Timestamp::new(created_at),
            kind: Kind::new(kind),
            tags,
            content: String::new(),
            sig: crate::event::Sig::default(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let ev = event_with(1, 100, Tags::default());
        assert!(Filter::new().matches(&ev));
    }

    #[test]
    fn each_populated_field_gates_the_match() {
        let ev = event_with(1, 100, Tags::new([Tag::new(["e", &hexkey(0x11)])]));

        let mut f = Filter::new();
        f.kinds = vec![Kind::new(1), Kind::new(3)];
        assert!(f.matches(&ev));
        f.kinds = vec![Kind::new(3)];
        assert!(!f.matches(&ev));

        let mut f = Filter::new();
        f.authors = vec![PubKey([0xaa; 32])];
        assert!(f.matches(&ev));
        f.authors = vec![PubKey([0xbb; 32])];
        assert!(!f.matches(&ev));

        let mut f = Filter::new();
        f.ids = vec![EventId([0x11; 32])];
        assert!(f.matches(&ev));
        f.ids = vec![EventId([0x22; 32])];
        assert!(!f.matches(&ev));

        let mut f = Filter::new();
        f.tags.insert("e".into(), vec![hexkey(0x11), hexkey(0x99)]);
        assert!(f.matches(&ev));
        f.tags.insert("e".into(), vec![hexkey(0x99)]);
        assert!(!f.matches(&ev));

        let mut f = Filter::new();
        f.since = Some(Timestamp::new(100));
        f.until = Some(Timestamp::new(100));
        assert!(f.matches(&ev));
        f.since = Some(Timestamp::new(101));
        assert!(!f.matches(&ev));
        f.since = None;
        f.until = Some(Timestamp::new(99));
        assert!(!f.matches(&ev));
    }

    #[test]
    fn canonical_marshal_sorts_and_orders_fields() {
        let mut f = Filter::new();
        f.limit = Some(10);
        f.kinds = vec![Kind::new(3), Kind::new(1)];
        f.authors = vec![PubKey([0xbb; 32]), PubKey([0xaa; 32])];
        f.since = Some(Timestamp::new(5));
        f.tags.insert("t".into(), vec!["zzz".into(), "aaa".into()]);

        let json = serde_json::to_string(&f).unwrap();
        let expected = format!(
            r##"{{"kinds":[1,3],"authors":["{}","{}"],"#t":["aaa","zzz"],"since":5,"limit":10}}"##,
            hexkey(0xaa),
            hexkey(0xbb),
        );
        assert_eq!(json, expected);
    }

    #[test]
    fn unmarshal_round_trips_canonical_form() {
        let json = format!(
            r##"{{"ids":["{}"],"kinds":[1,3],"#e":["{}"],"#t":["hashtag"],"until":9,"search":"needle","limit":2}}"##,
            hexkey(0x01),
            hexkey(0x02),
        );
        let f: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&f).unwrap(), json);
    }

    #[test]
    fn unmarshal_rejects_bad_tag_hex_and_unknown_keys() {
        assert!(serde_json::from_str::<Filter>(r##"{"#e":["zz"]}"##).is_err());
        assert!(serde_json::from_str::<Filter>(r##"{"#p":["abcd"]}"##).is_err());
        assert!(serde_json::from_str::<Filter>(r#"{"bogus":1}"#).is_err());
        // non-e/p tag values are free-form
        assert!(serde_json::from_str::<Filter>(r##"{"#t":["anything"]}"##).is_ok());
    }

    #[test]
    fn fingerprint_ignores_order_and_limit() {
        let mut a = Filter::new();
        a.kinds = vec![Kind::new(1), Kind::new(3)];
        a.authors = vec![PubKey([0xaa; 32])];
        a.limit = Some(100);

        let mut b = Filter::new();
        b.authors = vec![PubKey([0xaa; 32])];
        b.kinds = vec![Kind::new(3), Kind::new(1)];
        b.limit = Some(999);

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let mut c = b.clone();
        c.kinds.push(Kind::new(5));
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn filters_match_any() {
        let ev = event_with(7, 100, Tags::default());
        let mut miss = Filter::new();
        miss.kinds = vec![Kind::new(1)];
        let mut hit = Filter::new();
        hit.kinds = vec![Kind::new(7)];

        assert!(Filters::new([miss.clone(), hit]).matches(&ev));
        assert!(!Filters::single(miss).matches(&ev));
    }
}
