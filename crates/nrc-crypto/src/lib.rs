//! Schnorr/secp256k1 key material for the relay client.
//!
//! Two interchangeable backends implement the [`Signer`] trait: the default
//! `native` backend binds libsecp256k1 through the `secp256k1` crate, and the
//! `pure` feature swaps in a pure-Rust `k256` implementation for targets
//! without a C toolchain.  Both produce BIP-340 signatures and interoperate
//! bit-for-bit.
//!
//! Also hosts the NIP-19 bech32 identifier codec (`npub`, `nsec`, `note`,
//! `nprofile`, `nevent`, `naddr`) and hex key helpers.

pub mod keys;
pub mod nip19;

#[cfg(feature = "native")]
mod native;
#[cfg(feature = "pure")]
mod pure;

#[cfg(feature = "native")]
pub use native::NativeSigner;
#[cfg(feature = "pure")]
pub use pure::PureSigner;

/// Backend selected at build time.  `native` wins when both features are on.
#[cfg(feature = "native")]
pub type DefaultSigner = NativeSigner;
#[cfg(all(not(feature = "native"), feature = "pure"))]
pub type DefaultSigner = PureSigner;

#[cfg(not(any(feature = "native", feature = "pure")))]
compile_error!("nrc-crypto requires at least one of the `native` or `pure` features");

/// Size in bytes of an x-only public key, an event id and an ECDH secret.
pub const KEY_LEN: usize = 32;
/// Size in bytes of a BIP-340 Schnorr signature.
pub const SIG_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signer holds no secret key")]
    NoSecretKey,
    #[error("signer is not initialized")]
    Uninitialized,
    #[error("invalid key length: want {want} bytes, got {got}")]
    KeyLength { want: usize, got: usize },
    #[error("invalid signature length: want {SIG_LEN} bytes, got {0}")]
    SignatureLength(usize),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("bech32: {0}")]
    Bech32(String),
    #[error("wrong bech32 prefix: want {want}, got {got}")]
    WrongPrefix { want: String, got: String },
    #[error("malformed {kind} payload: {reason}")]
    MalformedPointer { kind: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Capability object binding secp256k1 key material to sign/verify/ECDH.
///
/// A fresh signer holds no keys; load one with [`Signer::generate`],
/// [`Signer::init_sec`] or [`Signer::init_pub`].  A pubkey-only signer can
/// verify but not sign.
pub trait Signer {
    /// Generate a fresh secret key from the OS RNG.
    fn generate(&mut self) -> Result<()>;
    /// Load a 32-byte secret key; derives the x-only public key.
    fn init_sec(&mut self, sec: &[u8]) -> Result<()>;
    /// Load a 32-byte x-only public key (verification only).
    fn init_pub(&mut self, pub_key: &[u8]) -> Result<()>;
    /// The x-only public key.
    fn pub_key(&self) -> Result<[u8; KEY_LEN]>;
    /// The secret key, if one is loaded.
    fn sec_key(&self) -> Result<[u8; KEY_LEN]>;
    /// BIP-340 sign a 32-byte message digest.
    fn sign(&self, msg: &[u8; 32]) -> Result<[u8; SIG_LEN]>;
    /// BIP-340 verify a signature over a 32-byte message digest.
    fn verify(&self, msg: &[u8; 32], sig: &[u8; SIG_LEN]) -> Result<bool>;
    /// Raw ECDH: the unhashed x coordinate of `sec * their_pub`.
    fn ecdh(&self, their_pub: &[u8; KEY_LEN]) -> Result<[u8; 32]>;
    /// Wipe the key material.
    fn zero(&mut self);
}

/// Verify a BIP-340 signature without constructing a [`Signer`].
pub fn verify(pub_key: &[u8; KEY_LEN], msg: &[u8; 32], sig: &[u8; SIG_LEN]) -> Result<bool> {
    let mut signer = DefaultSigner::default();
    signer.init_pub(pub_key)?;
    signer.verify(msg, sig)
}
