use std::fmt;

use cid::{multibase::Base, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    cid::{blake3, cid_from_digest, multicodec, multihash, parse_cid},
    error::CidError,
};

/// A fixed (codec, hash function, multibase) combination.
///
/// Changing any part of the triple changes every identifier issued under it,
/// so each combination is its own named scheme. Identifiers carry their codec
/// and hash code, which is how [`CidScheme::of`] recovers the scheme that
/// produced an identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CidScheme {
    /// CIDv1, `rdfc-1` codec, BLAKE3-256, base58btc (`z...`).
    #[default]
    RdfcBlake3Base58,
    /// CIDv1, `raw` codec, SHA2-256, base32 (`b...`). Identifiers issued
    /// before canonical linked data got its own codec.
    RawSha256Base32,
}

impl CidScheme {
    pub fn codec(self) -> u64 {
        match self {
            CidScheme::RdfcBlake3Base58 => multicodec::RDFC_1_0,
            CidScheme::RawSha256Base32 => multicodec::RAW_BINARY,
        }
    }

    pub fn hash_code(self) -> u64 {
        match self {
            CidScheme::RdfcBlake3Base58 => multihash::BLAKE3,
            CidScheme::RawSha256Base32 => multihash::SHA2_256,
        }
    }

    pub fn base(self) -> Base {
        match self {
            CidScheme::RdfcBlake3Base58 => Base::Base58Btc,
            CidScheme::RawSha256Base32 => Base::Base32Lower,
        }
    }

    /// Derives the identifier of `data` under this scheme.
    pub fn derive(self, data: &[u8]) -> Result<String, CidError> {
        if data.is_empty() {
            return Err(CidError::EmptyInput);
        }

        match self {
            CidScheme::RdfcBlake3Base58 => blake3::blake3_cid(self.codec(), data, self.base()),
            CidScheme::RawSha256Base32 => {
                let digest = Sha256::digest(data);
                cid_from_digest(self.codec(), self.hash_code(), &digest, self.base())
            }
        }
    }

    /// Recovers the scheme an identifier was issued under.
    pub fn of(cid: &str) -> Result<Self, CidError> {
        let parsed = parse_cid(cid)?;

        if parsed.version() != Version::V1 {
            return Err(CidError::Invalid {
                cid: cid.to_owned(),
                reason: "only CIDv1 identifiers are issued".to_owned(),
            });
        }

        let (codec, hash) = (parsed.codec(), parsed.hash().code());

        [CidScheme::RdfcBlake3Base58, CidScheme::RawSha256Base32]
            .into_iter()
            .find(|scheme| scheme.codec() == codec && scheme.hash_code() == hash)
            .ok_or_else(|| CidError::UnknownScheme {
                cid: cid.to_owned(),
                codec,
                hash,
            })
    }
}

impl fmt::Display for CidScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidScheme::RdfcBlake3Base58 => write!(f, "rdfc-blake3-base58"),
            CidScheme::RawSha256Base32 => write!(f, "raw-sha256-base32"),
        }
    }
}

/// Derives the identifier of canonical bytes under the current scheme.
pub fn derive_cid(canonical: &[u8]) -> Result<String, CidError> {
    CidScheme::default().derive(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANON: &[u8] = b"_:c14n0 <http://schema.org/name> \"Test\" .\n";

    #[test]
    fn derive_is_pure() {
        assert_eq!(derive_cid(CANON).unwrap(), derive_cid(CANON).unwrap());
    }

    #[test]
    fn distinct_input_distinct_cid() {
        let other = b"_:c14n0 <http://schema.org/name> \"Test2\" .\n";
        assert_ne!(derive_cid(CANON).unwrap(), derive_cid(other).unwrap());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(derive_cid(b""), Err(CidError::EmptyInput)));
    }

    #[test]
    fn fixed_length_and_alphabet() {
        let a = derive_cid(CANON).unwrap();
        let b = derive_cid(b"something entirely different\n").unwrap();

        assert_eq!(a.len(), b.len());
        assert!(a.starts_with('z'));
        // base58btc never uses 0, O, I or l
        assert!(a[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !"0OIl".contains(c)));
    }

    #[test]
    fn scheme_is_recoverable_from_identifier() {
        for scheme in [CidScheme::RdfcBlake3Base58, CidScheme::RawSha256Base32] {
            let cid = scheme.derive(CANON).unwrap();
            assert_eq!(CidScheme::of(&cid).unwrap(), scheme);
        }

        let legacy = CidScheme::RawSha256Base32.derive(CANON).unwrap();
        assert!(legacy.starts_with("bafkrei"), "{legacy}");
        assert_ne!(legacy, derive_cid(CANON).unwrap());
    }

    #[test]
    fn unknown_scheme_rejected() {
        let raw_blake3 = blake3::blake3_cid_raw_binary(CANON).unwrap();
        assert!(matches!(
            CidScheme::of(&raw_blake3),
            Err(CidError::UnknownScheme { .. })
        ));
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&CidScheme::RdfcBlake3Base58).unwrap(),
            "\"rdfc-blake3-base58\""
        );
        assert_eq!(
            CidScheme::RawSha256Base32.to_string(),
            "raw-sha256-base32"
        );
    }
}
