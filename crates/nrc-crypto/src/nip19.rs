//! NIP-19 bech32 identifier codec.
//!
//! Bare 32-byte payloads use `npub`/`nsec`/`note`; shareable pointers use
//! `nprofile`/`nevent`/`naddr` with TLV entries `{0: special, 1: relay,
//! 2: author, 3: kind}`.  Kind values are carried as big-endian u32.

use bech32::{Bech32, Hrp};

use crate::{Error, Result, KEY_LEN};

pub const NPUB_HRP: &str = "npub";
pub const NSEC_HRP: &str = "nsec";
pub const NOTE_HRP: &str = "note";
pub const NPROFILE_HRP: &str = "nprofile";
pub const NEVENT_HRP: &str = "nevent";
pub const NADDR_HRP: &str = "naddr";

const TLV_DEFAULT: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

/// A profile pointer (`nprofile`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePointer {
    pub public_key: [u8; KEY_LEN],
    pub relays: Vec<String>,
}

/// An event pointer (`nevent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPointer {
    pub id: [u8; 32],
    pub relays: Vec<String>,
    pub author: Option<[u8; KEY_LEN]>,
    pub kind: Option<u16>,
}

/// A replaceable-event address (`naddr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPointer {
    pub identifier: String,
    pub public_key: [u8; KEY_LEN],
    pub kind: u16,
    pub relays: Vec<String>,
}

/// Any NIP-19 entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Pub([u8; 32]),
    Sec([u8; 32]),
    Note([u8; 32]),
    Profile(ProfilePointer),
    Event(EventPointer),
    Addr(AddressPointer),
}

fn encode(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| Error::Bech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Error::Bech32(e.to_string()))
}

fn decode_raw(s: &str) -> Result<(String, Vec<u8>)> {
    let (hrp, data) = bech32::decode(s).map_err(|e| Error::Bech32(e.to_string()))?;
    Ok((hrp.to_string().to_lowercase(), data))
}

fn expect_32(kind: &'static str, data: &[u8]) -> Result<[u8; 32]> {
    if data.len() < 32 {
        return Err(Error::MalformedPointer {
            kind,
            reason: format!("payload is less than 32 bytes ({})", data.len()),
        });
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&data[..32]);
    Ok(out)
}

pub fn encode_npub(public_key: &[u8; KEY_LEN]) -> Result<String> {
    encode(NPUB_HRP, public_key)
}

pub fn encode_nsec(secret_key: &[u8; KEY_LEN]) -> Result<String> {
    encode(NSEC_HRP, secret_key)
}

pub fn encode_note(event_id: &[u8; 32]) -> Result<String> {
    encode(NOTE_HRP, event_id)
}

pub fn encode_nprofile(pointer: &ProfilePointer) -> Result<String> {
    let mut buf = Vec::new();
    write_tlv(&mut buf, TLV_DEFAULT, &pointer.public_key)?;
    for relay in &pointer.relays {
        write_tlv(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }
    encode(NPROFILE_HRP, &buf)
}

pub fn encode_nevent(pointer: &EventPointer) -> Result<String> {
    let mut buf = Vec::new();
    write_tlv(&mut buf, TLV_DEFAULT, &pointer.id)?;
    for relay in &pointer.relays {
        write_tlv(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }
    if let Some(author) = &pointer.author {
        write_tlv(&mut buf, TLV_AUTHOR, author)?;
    }
    if let Some(kind) = pointer.kind {
        write_tlv(&mut buf, TLV_KIND, &u32::from(kind).to_be_bytes())?;
    }
    encode(NEVENT_HRP, &buf)
}

pub fn encode_naddr(pointer: &AddressPointer) -> Result<String> {
    let mut buf = Vec::new();
    write_tlv(&mut buf, TLV_DEFAULT, pointer.identifier.as_bytes())?;
    for relay in &pointer.relays {
        write_tlv(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }
    write_tlv(&mut buf, TLV_AUTHOR, &pointer.public_key)?;
    write_tlv(&mut buf, TLV_KIND, &u32::from(pointer.kind).to_be_bytes())?;
    encode(NADDR_HRP, &buf)
}

/// Decode any NIP-19 string, dispatching on the human-readable prefix.
pub fn decode(s: &str) -> Result<Decoded> {
    let (hrp, data) = decode_raw(s)?;
    match hrp.as_str() {
        NPUB_HRP => Ok(Decoded::Pub(expect_32("npub", &data)?)),
        NSEC_HRP => Ok(Decoded::Sec(expect_32("nsec", &data)?)),
        NOTE_HRP => Ok(Decoded::Note(expect_32("note", &data)?)),
        NPROFILE_HRP => decode_nprofile(&data).map(Decoded::Profile),
        NEVENT_HRP => decode_nevent(&data).map(Decoded::Event),
        NADDR_HRP => decode_naddr(&data).map(Decoded::Addr),
        other => Err(Error::WrongPrefix {
            want: "npub|nsec|note|nprofile|nevent|naddr".into(),
            got: other.into(),
        }),
    }
}

fn decode_nprofile(data: &[u8]) -> Result<ProfilePointer> {
    let mut public_key = None;
    let mut relays = Vec::new();
    for (t, v) in TlvIter::new(data) {
        match t {
            TLV_DEFAULT => public_key = Some(expect_32("nprofile", v)?),
            TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
            _ => {}
        }
    }
    let public_key = public_key.ok_or(Error::MalformedPointer {
        kind: "nprofile",
        reason: "no pubkey entry".into(),
    })?;
    Ok(ProfilePointer { public_key, relays })
}

fn decode_nevent(data: &[u8]) -> Result<EventPointer> {
    let mut id = None;
    let mut relays = Vec::new();
    let mut author = None;
    let mut kind = None;
    for (t, v) in TlvIter::new(data) {
        match t {
            TLV_DEFAULT => id = Some(expect_32("nevent", v)?),
            TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
            TLV_AUTHOR => author = Some(expect_32("nevent", v)?),
            TLV_KIND => kind = Some(read_kind(v)?),
            _ => {}
        }
    }
    let id = id.ok_or(Error::MalformedPointer {
        kind: "nevent",
        reason: "no id entry".into(),
    })?;
    Ok(EventPointer {
        id,
        relays,
        author,
        kind,
    })
}

fn decode_naddr(data: &[u8]) -> Result<AddressPointer> {
    let mut identifier = None;
    let mut relays = Vec::new();
    let mut public_key = None;
    let mut kind = None;
    for (t, v) in TlvIter::new(data) {
        match t {
            TLV_DEFAULT => identifier = Some(String::from_utf8_lossy(v).into_owned()),
            TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
            TLV_AUTHOR => public_key = Some(expect_32("naddr", v)?),
            TLV_KIND => kind = Some(read_kind(v)?),
            _ => {}
        }
    }
    match (identifier, public_key, kind) {
        (Some(identifier), Some(public_key), Some(kind)) => Ok(AddressPointer {
            identifier,
            public_key,
            kind,
            relays,
        }),
        _ => Err(Error::MalformedPointer {
            kind: "naddr",
            reason: "missing identifier, author or kind entry".into(),
        }),
    }
}

fn read_kind(v: &[u8]) -> Result<u16> {
    if v.len() != 4 {
        return Err(Error::MalformedPointer {
            kind: "kind",
            reason: format!("kind entry is {} bytes, want 4", v.len()),
        });
    }
    let raw = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
    u16::try_from(raw).map_err(|_| Error::MalformedPointer {
        kind: "kind",
        reason: format!("kind {raw} exceeds u16"),
    })
}

fn write_tlv(buf: &mut Vec<u8>, t: u8, v: &[u8]) -> Result<()> {
    let len = u8::try_from(v.len()).map_err(|_| Error::MalformedPointer {
        kind: "tlv",
        reason: format!("entry of {} bytes exceeds the 255-byte TLV limit", v.len()),
    })?;
    buf.push(t);
    buf.push(len);
    buf.extend_from_slice(v);
    Ok(())
}

/// Iterates `[type, length, value…]` entries, stopping at truncated input.
struct TlvIter<'a> {
    data: &'a [u8],
}

impl<'a> TlvIter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }
        let t = self.data[0];
        let len = self.data[1] as usize;
        if self.data.len() < 2 + len {
            return None;
        }
        let v = &self.data[2..2 + len];
        self.data = &self.data[2 + len..];
        Some((t, v))
    }
}
