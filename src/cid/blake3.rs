use cid::multibase::Base;

use crate::{
    cid::{cid_from_digest, multicodec, multihash},
    error::CidError,
};

pub fn cid_from_blake3_hash(codec: u64, hash: &[u8], base: Base) -> Result<String, CidError> {
    cid_from_digest(codec, multihash::BLAKE3, hash, base)
}

pub fn blake3_cid(codec: u64, data: &[u8], base: Base) -> Result<String, CidError> {
    let hash = ::blake3::hash(data);

    cid_from_blake3_hash(codec, hash.as_bytes(), base)
}

pub fn blake3_cid_raw_binary(data: &[u8]) -> Result<String, CidError> {
    blake3_cid(multicodec::RAW_BINARY, data, Base::Base32Lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_binary_is_base32_v1() {
        let cid = blake3_cid_raw_binary(b"hello world").unwrap();
        // v1 + raw + blake3 in base32 always starts with this prefix
        assert!(cid.starts_with("bafkr4i"), "{cid}");
    }

    #[test]
    fn base58_prefix() {
        let cid = blake3_cid(multicodec::RDFC_1_0, b"data", Base::Base58Btc).unwrap();
        assert!(cid.starts_with('z'));
    }
}
