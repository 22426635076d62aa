/// secp256k1 elliptic curve signer
pub mod secp256k1_signer;

use std::{fs, path::PathBuf};

use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
pub use secp256k1_signer::*;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{KeyFileError, SignatureError};

/// Prefix of the Ethereum personal-message envelope.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Length of a recoverable signature, r‖s‖v.
pub const SIGNATURE_LENGTH: usize = 65;

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// How the message is turned into the 32-byte digest that gets signed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningMode {
    /// Keccak-256 of the message itself.
    #[default]
    RawDigest,
    /// Keccak-256 of the personal-message envelope around the message.
    PersonalMessage,
}

impl SigningMode {
    pub fn from_personal_sign(use_personal_sign: bool) -> Self {
        if use_personal_sign {
            SigningMode::PersonalMessage
        } else {
            SigningMode::RawDigest
        }
    }

    pub fn is_personal_sign(self) -> bool {
        self == SigningMode::PersonalMessage
    }

    /// The digest a signature in this mode commits to.
    pub fn digest(self, message: &[u8]) -> [u8; 32] {
        match self {
            SigningMode::RawDigest => keccak256(message),
            SigningMode::PersonalMessage => {
                let mut hasher = Keccak256::new();
                hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
                hasher.update(message.len().to_string().as_bytes());
                hasher.update(message);
                hasher.finalize().into()
            }
        }
    }
}

/// Detached signature record stored next to a sealed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMetadata {
    /// `0x`-prefixed hex of r‖s‖v.
    pub signature: String,
    /// `0x`-prefixed hex of the 20-byte signer address.
    pub signer_address: String,
    pub use_personal_sign: bool,
}

impl SignatureMetadata {
    pub fn new(signature: &[u8; SIGNATURE_LENGTH], signer_address: &str, mode: SigningMode) -> Self {
        Self {
            signature: format!("0x{}", hex::encode(signature)),
            signer_address: signer_address.to_owned(),
            use_personal_sign: mode.is_personal_sign(),
        }
    }

    pub fn mode(&self) -> SigningMode {
        SigningMode::from_personal_sign(self.use_personal_sign)
    }

    /// Checks this record against the bytes it claims to sign.
    pub fn verify(&self, message: &[u8]) -> Result<bool, SignatureError> {
        verify(message, &self.signature, &self.signer_address, self.mode())
    }
}

/// Trait for cryptographic signing operations.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `data` under `mode` and returns a recoverable signature r‖s‖v
    /// with v in {27, 28}.
    async fn sign(
        &self,
        data: &[u8],
        mode: SigningMode,
    ) -> Result<[u8; SIGNATURE_LENGTH], SignatureError>;

    /// `0x`-prefixed lowercase hex address of the signing key.
    fn address(&self) -> String;

    /// Signs `data` and packages the result as a storable record.
    async fn sign_metadata(
        &self,
        data: &[u8],
        mode: SigningMode,
    ) -> Result<SignatureMetadata, SignatureError> {
        let signature = self.sign(data, mode).await?;
        Ok(SignatureMetadata::new(&signature, &self.address(), mode))
    }
}

/// Enum representing all supported signer implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignerType {
    /// secp256k1 local signer
    SECP256K1(Secp256k1Signer),
}

#[async_trait]
impl Signer for SignerType {
    async fn sign(
        &self,
        data: &[u8],
        mode: SigningMode,
    ) -> Result<[u8; SIGNATURE_LENGTH], SignatureError> {
        match self {
            SignerType::SECP256K1(signer) => signer.sign(data, mode).await,
        }
    }

    fn address(&self) -> String {
        match self {
            SignerType::SECP256K1(signer) => signer.address(),
        }
    }
}

/// Ethereum-style address of a public key: the last 20 bytes of the
/// Keccak-256 of the uncompressed point without its tag byte.
pub fn eth_address(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>, SignatureError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(digits).map_err(|e| SignatureError::Encoding(format!("{what}: {e}")))
}

/// Verifies that `signature_hex` over `message` was produced by
/// `claimed_address`.
///
/// A well-formed signature from a different key yields `Ok(false)`. The
/// recovery byte may be given as 27/28 or as 0/1.
pub fn verify(
    message: &[u8],
    signature_hex: &str,
    claimed_address: &str,
    mode: SigningMode,
) -> Result<bool, SignatureError> {
    let claimed = decode_hex(claimed_address, "address")?;
    if claimed.len() != 20 {
        return Err(SignatureError::Encoding(format!(
            "address must be 20 bytes, got {}",
            claimed.len()
        )));
    }

    let bytes = decode_hex(signature_hex, "signature")?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(SignatureError::Length(bytes.len()));
    }

    let v = bytes[64];
    let recovery_id = match v {
        27 | 28 => RecoveryId::from_byte(v - 27),
        0 | 1 => RecoveryId::from_byte(v),
        _ => None,
    }
    .ok_or(SignatureError::RecoveryId(v))?;

    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| SignatureError::Encoding(format!("invalid r/s: {e}")))?;

    let digest = mode.digest(message);
    let recovered = match VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id) {
        Ok(key) => key,
        Err(e) => {
            log::debug!("public key recovery failed: {e}");
            return Ok(false);
        }
    };

    Ok(eth_address(&recovered)[..] == claimed[..])
}

/// Saves a signer to a file in the specified folder.
///
/// The signer is serialized to JSON and base64-encoded before writing.
pub fn save_signer(signer: &SignerType, folder: PathBuf, name: &str) -> Result<(), KeyFileError> {
    let signer_file = folder.join(name);

    let signer_str = serde_json::to_string(&signer)?;

    let signer_base64 = BASE64.encode(signer_str);
    fs::write(signer_file, signer_base64)?;
    Ok(())
}

/// Loads a signer from a file written by [`save_signer`].
pub fn load_signer(signer_file: PathBuf) -> Result<SignerType, KeyFileError> {
    let signer_base64 = fs::read_to_string(&signer_file)?;
    let signer_bytes = BASE64.decode(signer_base64.trim())?;
    let signer_str = String::from_utf8(signer_bytes)?;
    let signer = serde_json::from_str(&signer_str)?;
    Ok(signer)
}
