//! Hex key parsing helpers.

use crate::{DefaultSigner, Error, Result, Signer, KEY_LEN};

/// Length of a hex-encoded 32-byte key.
pub const HEX_KEY_LEN: usize = 64;

/// Decode a 64-character hex string into 32 key bytes.
pub fn hex_to_bytes(s: &str) -> Result<[u8; KEY_LEN]> {
    if s.len() != HEX_KEY_LEN {
        return Err(Error::KeyLength {
            want: KEY_LEN,
            got: s.len() / 2,
        });
    }
    let raw = hex::decode(s)?;
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&raw);
    Ok(out)
}

/// Decode and validate a hex-encoded x-only public key.
pub fn parse_public_key(s: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex_to_bytes(s)?;
    let mut signer = DefaultSigner::default();
    signer.init_pub(&bytes)?;
    Ok(bytes)
}

/// Whether `s` is a 64-character hex string naming a point on the curve.
pub fn is_valid_public_key(s: &str) -> bool {
    parse_public_key(s).is_ok()
}
