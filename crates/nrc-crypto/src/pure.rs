//! Pure-Rust signer backend over `k256` (RustCrypto).
//!
//! Selected with the `pure` feature for targets without a C toolchain.
//! Signatures are BIP-340 and interchange with the native backend.

use k256::elliptic_curve::ecdh::diffie_hellman;
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{Error, Result, Signer, KEY_LEN, SIG_LEN};

#[derive(Default)]
pub struct PureSigner {
    signing: Option<SigningKey>,
    verifying: Option<VerifyingKey>,
}

impl Signer for PureSigner {
    fn generate(&mut self) -> Result<()> {
        let signing = SigningKey::random(&mut OsRng);
        self.verifying = Some(signing.verifying_key().clone());
        self.signing = Some(signing);
        Ok(())
    }

    fn init_sec(&mut self, sec: &[u8]) -> Result<()> {
        if sec.len() != KEY_LEN {
            return Err(Error::KeyLength {
                want: KEY_LEN,
                got: sec.len(),
            });
        }
        let signing = SigningKey::from_bytes(sec).map_err(|e| Error::InvalidKey(e.to_string()))?;
        self.verifying = Some(signing.verifying_key().clone());
        self.signing = Some(signing);
        Ok(())
    }

    fn init_pub(&mut self, pub_key: &[u8]) -> Result<()> {
        if pub_key.len() != KEY_LEN {
            return Err(Error::KeyLength {
                want: KEY_LEN,
                got: pub_key.len(),
            });
        }
        let verifying =
            VerifyingKey::from_bytes(pub_key).map_err(|e| Error::InvalidKey(e.to_string()))?;
        self.signing = None;
        self.verifying = Some(verifying);
        Ok(())
    }

    fn pub_key(&self) -> Result<[u8; KEY_LEN]> {
        let verifying = self.verifying.as_ref().ok_or(Error::Uninitialized)?;
        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(&verifying.to_bytes());
        Ok(out)
    }

    fn sec_key(&self) -> Result<[u8; KEY_LEN]> {
        let signing = self.signing.as_ref().ok_or(Error::NoSecretKey)?;
        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(&signing.to_bytes());
        Ok(out)
    }

    fn sign(&self, msg: &[u8; 32]) -> Result<[u8; SIG_LEN]> {
        let signing = self.signing.as_ref().ok_or(Error::NoSecretKey)?;
        let mut aux = [0u8; 32];
        OsRng.fill_bytes(&mut aux);
        let sig = signing
            .sign_raw(msg, &aux)
            .map_err(|e| Error::Sign(e.to_string()))?;
        let mut out = [0u8; SIG_LEN];
        out.copy_from_slice(&sig.to_bytes());
        Ok(out)
    }

    fn verify(&self, msg: &[u8; 32], sig: &[u8; SIG_LEN]) -> Result<bool> {
        let verifying = self.verifying.as_ref().ok_or(Error::Uninitialized)?;
        let Ok(sig) = Signature::try_from(sig.as_slice()) else {
            return Ok(false);
        };
        Ok(verifying.verify_raw(msg, &sig).is_ok())
    }

    fn ecdh(&self, their_pub: &[u8; KEY_LEN]) -> Result<[u8; 32]> {
        let signing = self.signing.as_ref().ok_or(Error::NoSecretKey)?;
        let sec = k256::SecretKey::from_slice(&signing.to_bytes())
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        // Lift the x-only key to the even-Y point (SEC1 tag 0x02).
        let mut sec1 = [0u8; 33];
        sec1[0] = 0x02;
        sec1[1..].copy_from_slice(their_pub);
        let their = k256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let shared = diffie_hellman(sec.to_nonzero_scalar(), their.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }

    fn zero(&mut self) {
        self.signing = None;
        self.verifying = None;
    }
}
