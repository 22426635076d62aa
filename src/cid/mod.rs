/// BLAKE3-based CID utilities
pub mod blake3;
/// Versioned (codec, hash, multibase) identifier schemes
pub mod scheme;

use std::str::FromStr;

use cid::{multibase::Base, multihash::Multihash, Cid};

pub use scheme::{derive_cid, CidScheme};

use crate::error::CidError;

/// Multicodec identifiers for content types
pub mod multicodec {
    /// Raw binary data
    pub const RAW_BINARY: u64 = 0x55;
    /// RDF Dataset Canonicalization (RDFC) 1.0
    pub const RDFC_1_0: u64 = 0xb403;
}

/// Multihash identifiers for hash algorithms
pub mod multihash {
    /// SHA2-256 hash
    pub const SHA2_256: u64 = 0x12;
    /// BLAKE3 hash
    pub const BLAKE3: u64 = 0x1e;
}

/// Wraps `digest` as a multihash with `hash_code` and encodes it as a CIDv1
/// string in `base`.
pub fn cid_from_digest(
    codec: u64,
    hash_code: u64,
    digest: &[u8],
    base: Base,
) -> Result<String, CidError> {
    let multihash = Multihash::<64>::wrap(hash_code, digest).map_err(|e| CidError::Invalid {
        cid: String::new(),
        reason: e.to_string(),
    })?;

    let cid = Cid::new_v1(codec, multihash);

    cid.to_string_of_base(base).map_err(|e| CidError::Invalid {
        cid: cid.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a CID string in any multibase encoding.
pub fn parse_cid(cid: &str) -> Result<Cid, CidError> {
    Cid::from_str(cid).map_err(|e| CidError::Invalid {
        cid: cid.to_owned(),
        reason: e.to_string(),
    })
}

/// Extracts the multicodec identifier from a CID string
///
/// # Arguments
/// * `cid` - The CID string
///
/// # Returns
/// The multicodec identifier
pub fn get_multicodec(cid: &str) -> Result<u64, CidError> {
    Ok(parse_cid(cid)?.codec())
}

/// Strips a `<scheme>://` prefix from an identifier if present.
///
/// # Arguments
/// * `id` - The identifier, optionally prefixed (e.g. `ipfs://z...`)
/// * `scheme` - The scheme to strip (e.g. `ipfs`)
///
/// # Returns
/// The bare CID
pub fn strip_id_scheme<'a>(id: &'a str, scheme: &str) -> &'a str {
    id.strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix("://"))
        .unwrap_or(id)
}

/// Prepends `<scheme>://` to a CID if not already present.
///
/// # Arguments
/// * `cid` - The CID string
/// * `scheme` - The scheme to prepend (e.g. `ipfs`)
///
/// # Returns
/// The identifier in `<scheme>://<cid>` form
pub fn prepend_id_scheme(cid: &str, scheme: &str) -> Result<String, CidError> {
    if cid.is_empty() {
        return Err(CidError::Invalid {
            cid: String::new(),
            reason: format!("attempted to prepend '{scheme}://' to an empty string"),
        });
    }

    if strip_id_scheme(cid, scheme).len() != cid.len() {
        Ok(cid.to_owned())
    } else {
        Ok(format!("{scheme}://{cid}"))
    }
}
