use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::{
    error::SignatureError,
    signer::{eth_address, format_address, Signer, SigningMode, SIGNATURE_LENGTH},
};

/// Signer implementation using secp256k1 elliptic curve.
///
/// Serialized as the raw secret key only; the address is re-derived on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "KeyMaterial", into = "KeyMaterial")]
pub struct Secp256k1Signer {
    signing_key: SigningKey,
    /// `0x`-prefixed address derived from the public key
    address: String,
}

#[derive(Serialize, Deserialize)]
struct KeyMaterial {
    secret_key: Vec<u8>,
}

impl TryFrom<KeyMaterial> for Secp256k1Signer {
    type Error = SignatureError;

    fn try_from(material: KeyMaterial) -> Result<Self, Self::Error> {
        Secp256k1Signer::import(&material.secret_key)
    }
}

impl From<Secp256k1Signer> for KeyMaterial {
    fn from(signer: Secp256k1Signer) -> Self {
        KeyMaterial {
            secret_key: signer.signing_key.to_bytes().to_vec(),
        }
    }
}

impl Secp256k1Signer {
    /// Creates a new Secp256k1Signer instance with a randomly generated key.
    pub fn create() -> Result<Self, SignatureError> {
        let mut secret_key = [0u8; 32];
        // out-of-range scalars are rejected by import; draw again
        loop {
            getrandom::getrandom(&mut secret_key)
                .map_err(|e| SignatureError::Key(format!("no entropy available: {e}")))?;
            if let Ok(signer) = Self::import(&secret_key) {
                return Ok(signer);
            }
        }
    }

    /// Imports a Secp256k1Signer instance from a given secret key.
    ///
    /// # Arguments
    ///
    /// * `secret_key` - The 32-byte secret key to import.
    pub fn import(secret_key: &[u8]) -> Result<Self, SignatureError> {
        let signing_key = SigningKey::from_slice(secret_key)
            .map_err(|e| SignatureError::Key(format!("invalid secp256k1 secret key: {e}")))?;
        let address = format_address(&eth_address(signing_key.verifying_key()));

        Ok(Secp256k1Signer {
            signing_key,
            address,
        })
    }
}

#[async_trait]
impl Signer for Secp256k1Signer {
    async fn sign(
        &self,
        data: &[u8],
        mode: SigningMode,
    ) -> Result<[u8; SIGNATURE_LENGTH], SignatureError> {
        log::trace!("Signing {} bytes with {} ({mode:?})", data.len(), self.address);

        let digest = mode.digest(data);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignatureError::Signing(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_rejects_bad_keys() {
        assert!(matches!(
            Secp256k1Signer::import(&[0u8; 32]),
            Err(SignatureError::Key(_))
        ));
        assert!(matches!(
            Secp256k1Signer::import(&[1u8; 16]),
            Err(SignatureError::Key(_))
        ));
    }

    #[test]
    fn serialized_form_holds_secret_only() {
        let secret = hex::decode("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
            .unwrap();
        let signer = Secp256k1Signer::import(&secret).unwrap();

        let value = serde_json::to_value(&signer).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert_eq!(value["secret_key"].as_array().unwrap().len(), 32);

        let restored: Secp256k1Signer = serde_json::from_value(value).unwrap();
        assert_eq!(restored.address(), "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23");
    }

    #[test]
    fn created_keys_differ() {
        let a = Secp256k1Signer::create().unwrap();
        let b = Secp256k1Signer::create().unwrap();
        assert_ne!(a.address(), b.address());
    }
}
