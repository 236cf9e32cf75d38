//! Default signer backend over libsecp256k1 (the `secp256k1` crate).

use rand::rngs::OsRng;
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, Parity, PublicKey, SecretKey, XOnlyPublicKey, SECP256K1};

use crate::{Error, Result, Signer, KEY_LEN, SIG_LEN};

/// Signer bound to libsecp256k1 through the global verification context.
#[derive(Default)]
pub struct NativeSigner {
    keypair: Option<Keypair>,
    pub_key: Option<XOnlyPublicKey>,
}

impl NativeSigner {
    fn set_keypair(&mut self, keypair: Keypair) {
        let (xonly, _parity) = XOnlyPublicKey::from_keypair(&keypair);
        self.keypair = Some(keypair);
        self.pub_key = Some(xonly);
    }
}

impl Signer for NativeSigner {
    fn generate(&mut self) -> Result<()> {
        let sec = SecretKey::new(&mut OsRng);
        self.set_keypair(Keypair::from_secret_key(SECP256K1, &sec));
        Ok(())
    }

    fn init_sec(&mut self, sec: &[u8]) -> Result<()> {
        if sec.len() != KEY_LEN {
            return Err(Error::KeyLength {
                want: KEY_LEN,
                got: sec.len(),
            });
        }
        let sec = SecretKey::from_slice(sec).map_err(|e| Error::InvalidKey(e.to_string()))?;
        self.set_keypair(Keypair::from_secret_key(SECP256K1, &sec));
        Ok(())
    }

    fn init_pub(&mut self, pub_key: &[u8]) -> Result<()> {
        if pub_key.len() != KEY_LEN {
            return Err(Error::KeyLength {
                want: KEY_LEN,
                got: pub_key.len(),
            });
        }
        let xonly =
            XOnlyPublicKey::from_slice(pub_key).map_err(|e| Error::InvalidKey(e.to_string()))?;
        self.keypair = None;
        self.pub_key = Some(xonly);
        Ok(())
    }

    fn pub_key(&self) -> Result<[u8; KEY_LEN]> {
        self.pub_key
            .map(|pk| pk.serialize())
            .ok_or(Error::Uninitialized)
    }

    fn sec_key(&self) -> Result<[u8; KEY_LEN]> {
        self.keypair
            .as_ref()
            .map(Keypair::secret_bytes)
            .ok_or(Error::NoSecretKey)
    }

    fn sign(&self, msg: &[u8; 32]) -> Result<[u8; SIG_LEN]> {
        let keypair = self.keypair.as_ref().ok_or(Error::NoSecretKey)?;
        let sig = SECP256K1.sign_schnorr(&Message::from_digest(*msg), keypair);
        let mut out = [0u8; SIG_LEN];
        out.copy_from_slice(sig.as_ref());
        Ok(out)
    }

    fn verify(&self, msg: &[u8; 32], sig: &[u8; SIG_LEN]) -> Result<bool> {
        let pub_key = self.pub_key.ok_or(Error::Uninitialized)?;
        let Ok(sig) = Signature::from_slice(sig) else {
            return Ok(false);
        };
        Ok(SECP256K1
            .verify_schnorr(&sig, &Message::from_digest(*msg), &pub_key)
            .is_ok())
    }

    fn ecdh(&self, their_pub: &[u8; KEY_LEN]) -> Result<[u8; 32]> {
        let keypair = self.keypair.as_ref().ok_or(Error::NoSecretKey)?;
        let xonly =
            XOnlyPublicKey::from_slice(their_pub).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let full = PublicKey::from_x_only_public_key(xonly, Parity::Even);
        // Unhashed x coordinate, as NIP-04/NIP-44 require.
        let point = secp256k1::ecdh::shared_secret_point(&full, &keypair.secret_key());
        let mut out = [0u8; 32];
        out.copy_from_slice(&point[..32]);
        Ok(out)
    }

    fn zero(&mut self) {
        if let Some(keypair) = self.keypair.as_mut() {
            keypair.non_secure_erase();
        }
        self.keypair = None;
        self.pub_key = None;
    }
}
