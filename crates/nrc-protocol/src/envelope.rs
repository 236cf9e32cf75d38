//! Envelope codec: tagged-JSON-array framing.
//!
//! Every frame is `["<TAG>", …payload]`.  [`ClientMessage`] covers the
//! client→relay direction (EVENT submission, REQ, COUNT request, CLOSE,
//! AUTH response); [`RelayMessage`] the relay→client direction (EVENT
//! result, OK, EOSE, CLOSED, NOTICE, AUTH challenge, COUNT response).
//!
//! Marshalling is deterministic, so unmarshal-then-marshal reproduces the
//! canonical bytes exactly.  A frame with an unknown leading tag or a
//! malformed payload surfaces as a decode error the reader drops and moves
//! past; it is never fatal to the connection.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::{Event, EventId};
use crate::filter::{Filter, Filters};
use crate::subscription_id::SubscriptionId;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`: submit an event for storage.
    Event(Event),
    /// `["REQ", <sub id>, <filter>…]`: open a subscription.
    Req {
        id: SubscriptionId,
        filters: Filters,
    },
    /// `["COUNT", <sub id>, <filter>…]`: ask for a match count.
    Count {
        id: SubscriptionId,
        filters: Filters,
    },
    /// `["CLOSE", <sub id>]`: tear down a subscription.
    Close(SubscriptionId),
    /// `["AUTH", <event>]`: signed NIP-42 challenge response (kind 22242).
    Auth(Event),
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", <sub id>, <event>]`: an event matching a subscription.
    Event {
        subscription: SubscriptionId,
        event: Event,
    },
    /// `["OK", <event id hex>, <bool>, <reason>]`: submission ack/nack.
    Ok {
        id: EventId,
        accepted: bool,
        reason: String,
    },
    /// `["EOSE", <sub id>]`: end of stored events.
    Eose(SubscriptionId),
    /// `["CLOSED", <sub id>, <reason>]`: server-side termination.
    Closed {
        subscription: SubscriptionId,
        reason: String,
    },
    /// `["NOTICE", <message>]`: human-readable notice.
    Notice(String),
    /// `["AUTH", <challenge>]`: NIP-42 challenge.
    Auth { challenge: String },
    /// `["COUNT", <sub id>, <count>(, true)]`: count response; the trailing
    /// `true` marks an approximate count.
    Count {
        subscription: SubscriptionId,
        count: u64,
        approximate: bool,
    },
}

impl ClientMessage {
    /// The leading tag string.
    pub fn label(&self) -> &'static str {
        match self {
            ClientMessage::Event(_) => "EVENT",
            ClientMessage::Req { .. } => "REQ",
            ClientMessage::Count { .. } => "COUNT",
            ClientMessage::Close(_) => "CLOSE",
            ClientMessage::Auth(_) => "AUTH",
        }
    }
}

impl RelayMessage {
    /// The leading tag string.
    pub fn label(&self) -> &'static str {
        match self {
            RelayMessage::Event { .. } => "EVENT",
            RelayMessage::Ok { .. } => "OK",
            RelayMessage::Eose(_) => "EOSE",
            RelayMessage::Closed { .. } => "CLOSED",
            RelayMessage::Notice(_) => "NOTICE",
            RelayMessage::Auth { .. } => "AUTH",
            RelayMessage::Count { .. } => "COUNT",
        }
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClientMessage::Event(ev) | ClientMessage::Auth(ev) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(ev)?;
                seq.end()
            }
            ClientMessage::Req { id, filters } | ClientMessage::Count { id, filters } => {
                let mut seq = serializer.serialize_seq(Some(2 + filters.len()))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(id)?;
                for filter in filters.iter() {
                    seq.serialize_element(filter)?;
                }
                seq.end()
            }
            ClientMessage::Close(id) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(id)?;
                seq.end()
            }
        }
    }
}

impl Serialize for RelayMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelayMessage::Event {
                subscription,
                event,
            } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(subscription)?;
                seq.serialize_element(event)?;
                seq.end()
            }
            RelayMessage::Ok {
                id,
                accepted,
                reason,
            } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(id)?;
                seq.serialize_element(accepted)?;
                seq.serialize_element(reason)?;
                seq.end()
            }
            RelayMessage::Eose(id) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(id)?;
                seq.end()
            }
            RelayMessage::Closed {
                subscription,
                reason,
            } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(subscription)?;
                seq.serialize_element(reason)?;
                seq.end()
            }
            RelayMessage::Notice(message) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(message)?;
                seq.end()
            }
            RelayMessage::Auth { challenge } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(challenge)?;
                seq.end()
            }
            RelayMessage::Count {
                subscription,
                count,
                approximate,
            } => {
                let len = if *approximate { 4 } else { 3 };
                let mut seq = serializer.serialize_seq(Some(len))?;
                seq.serialize_element(self.label())?;
                seq.serialize_element(subscription)?;
                seq.serialize_element(count)?;
                if *approximate {
                    seq.serialize_element(&true)?;
                }
                seq.end()
            }
        }
    }
}

fn need<'de, A, T>(seq: &mut A, what: &'static str) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element::<T>()?
        .ok_or_else(|| de::Error::custom(format!("envelope is missing its {what}")))
}

/// Consume any trailing elements so extended payloads stay decodable.
fn drain<'de, A: SeqAccess<'de>>(seq: &mut A) -> Result<(), A::Error> {
    while seq.next_element::<IgnoredAny>()?.is_some() {}
    Ok(())
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = ClientMessage;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged client envelope array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: String = need(&mut seq, "tag")?;
                let msg = match tag.as_str() {
                    "EVENT" => ClientMessage::Event(need(&mut seq, "event")?),
                    "AUTH" => ClientMessage::Auth(need(&mut seq, "event")?),
                    "CLOSE" => ClientMessage::Close(need(&mut seq, "subscription id")?),
                    "REQ" | "COUNT" => {
                        let id: SubscriptionId = need(&mut seq, "subscription id")?;
                        let mut filters = Vec::new();
                        while let Some(filter) = seq.next_element::<Filter>()? {
                            filters.push(filter);
                        }
                        if filters.is_empty() {
                            return Err(de::Error::custom(format!(
                                "{tag} envelope carries no filters"
                            )));
                        }
                        let filters = Filters(filters);
                        if tag == "REQ" {
                            ClientMessage::Req { id, filters }
                        } else {
                            ClientMessage::Count { id, filters }
                        }
                    }
                    other => {
                        return Err(de::Error::custom(format!("unknown envelope tag {other:?}")))
                    }
                };
                drain(&mut seq)?;
                Ok(msg)
            }
        }

        deserializer.deserialize_seq(V)
    }
}

impl<'de> Deserialize<'de> for RelayMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = RelayMessage;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged relay envelope array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: String = need(&mut seq, "tag")?;
                let msg = match tag.as_str() {
                    "EVENT" => RelayMessage::Event {
                        subscription: need(&mut seq, "subscription id")?,
                        event: need(&mut seq, "event")?,
                    },
                    "OK" => RelayMessage::Ok {
                        id: need(&mut seq, "event id")?,
                        accepted: need(&mut seq, "flag")?,
                        reason: seq.next_element::<String>()?.unwrap_or_default(),
                    },
                    "EOSE" => RelayMessage::Eose(need(&mut seq, "subscription id")?),
                    "CLOSED" => RelayMessage::Closed {
                        subscription: need(&mut seq, "subscription id")?,
                        reason: seq.next_element::<String>()?.unwrap_or_default(),
                    },
                    "NOTICE" => RelayMessage::Notice(need(&mut seq, "message")?),
                    "AUTH" => RelayMessage::Auth {
                        challenge: need(&mut seq, "challenge")?,
                    },
                    "COUNT" => RelayMessage::Count {
                        subscription: need(&mut seq, "subscription id")?,
                        count: need(&mut seq, "count")?,
                        approximate: seq.next_element::<bool>()?.unwrap_or_default(),
                    },
                    other => {
                        return Err(de::Error::custom(format!("unknown envelope tag {other:?}")))
                    }
                };
                drain(&mut seq)?;
                Ok(msg)
            }
        }

        deserializer.deserialize_seq(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Kind, PubKey, Sig, Timestamp};
    use crate::tag::{Tag, Tags};

    fn sample_event() -> Event {
        Event {
            id: EventId([0x01; 32]),
            pubkey: PubKey([0x02; 32]),
            created_at: Timestamp::new(1_672_068_534),
            kind: Kind::TEXT_NOTE,
            tags: Tags::new([Tag::new(["foo", "bar"])]),
            content: "hello".into(),
            sig: Sig([0x03; 64]),
        }
    }

    fn sub_id(s: &str) -> SubscriptionId {
        SubscriptionId::new(s).unwrap()
    }

    fn assert_round_trip_client(msg: &ClientMessage) {
        let first = serde_json::to_string(msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        assert_eq!(first, second, "marshal is not idempotent for {msg:?}");
        assert_eq!(&back, msg);
    }

    fn assert_round_trip_relay(msg: &RelayMessage) {
        let first = serde_json::to_string(msg).unwrap();
        let back: RelayMessage = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        assert_eq!(first, second, "marshal is not idempotent for {msg:?}");
        assert_eq!(&back, msg);
    }

    #[test]
    fn client_envelopes_round_trip() {
        let mut filter = Filter::new();
        filter.kinds = vec![Kind::TEXT_NOTE];
        filter.limit = Some(2);
        let mut second = Filter::new();
        second.authors = vec![PubKey([0xaa; 32])];

        assert_round_trip_client(&ClientMessage::Event(sample_event()));
        assert_round_trip_client(&ClientMessage::Auth(sample_event()));
        assert_round_trip_client(&ClientMessage::Close(sub_id(":9")));
        assert_round_trip_client(&ClientMessage::Req {
            id: sub_id(":1"),
            filters: Filters::new([filter.clone(), second]),
        });
        assert_round_trip_client(&ClientMessage::Count {
            id: sub_id("c:2"),
            filters: Filters::single(filter),
        });
    }

    #[test]
    fn relay_envelopes_round_trip() {
        assert_round_trip_relay(&RelayMessage::Event {
            subscription: sub_id(":1"),
            event: sample_event(),
        });
        assert_round_trip_relay(&RelayMessage::Ok {
            id: EventId([0x01; 32]),
            accepted: false,
            reason: "blocked: no reason".into(),
        });
        assert_round_trip_relay(&RelayMessage::Eose(sub_id(":1")));
        assert_round_trip_relay(&RelayMessage::Closed {
            subscription: sub_id(":1"),
            reason: "auth-required: do auth first".into(),
        });
        assert_round_trip_relay(&RelayMessage::Notice("slow down".into()));
        assert_round_trip_relay(&RelayMessage::Auth {
            challenge: "nchal1example".into(),
        });
        assert_round_trip_relay(&RelayMessage::Count {
            subscription: sub_id(":1"),
            count: 42,
            approximate: false,
        });
        assert_round_trip_relay(&RelayMessage::Count {
            subscription: sub_id(":1"),
            count: 42,
            approximate: true,
        });
    }

    #[test]
    fn req_wire_form_is_flat() {
        let mut filter = Filter::new();
        filter.kinds = vec![Kind::TEXT_NOTE];
        filter.limit = Some(2);
        let msg = ClientMessage::Req {
            id: sub_id(":1"),
            filters: Filters::single(filter),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"["REQ",":1",{"kinds":[1],"limit":2}]"#
        );
    }

    #[test]
    fn count_approximate_marker_is_a_trailing_true() {
        let msg = RelayMessage::Count {
            subscription: sub_id(":1"),
            count: 7,
            approximate: true,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"["COUNT",":1",7,true]"#
        );
    }

    #[test]
    fn unknown_or_malformed_frames_are_errors() {
        assert!(serde_json::from_str::<RelayMessage>(r#"["BOGUS","x"]"#).is_err());
        assert!(serde_json::from_str::<RelayMessage>(r#"["OK"]"#).is_err());
        assert!(serde_json::from_str::<RelayMessage>(r#"{"not":"an array"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"["REQ",":1"]"#).is_err());
        // bad hex length in the OK event id
        assert!(serde_json::from_str::<RelayMessage>(r#"["OK","abcd",true,""]"#).is_err());
    }

    #[test]
    fn trailing_elements_are_tolerated() {
        let msg: RelayMessage =
            serde_json::from_str(r#"["EOSE",":1","future-extension"]"#).unwrap();
        assert_eq!(msg, RelayMessage::Eose(sub_id(":1")));
    }

    #[test]
    fn whitespace_between_elements_is_tolerated() {
        let msg: RelayMessage =
            serde_json::from_str("  [ \"NOTICE\" , \"spaced out\" ]  ").unwrap();
        assert_eq!(msg, RelayMessage::Notice("spaced out".into()));
    }
}
