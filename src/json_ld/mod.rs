/// JSON-LD context loading utilities
pub mod loader;
/// JSON-LD to RDF expansion and N-Quads conversion
pub mod to_nquads;

use serde_json::Value;

pub use to_nquads::ExpansionOptions;

use crate::{
    cid::CidScheme,
    error::{CanonicalizationError, SealError},
    json_ld::{loader::ContextResolver, to_nquads::expand_to_quads},
    nquads,
};

/// Default budget of Hash N-Degree Quads calls during labeling.
pub const DEFAULT_MAX_WORK: u64 = 100_000;

/// Settings for turning a JSON-LD document into canonical N-Quads.
#[derive(Clone, Debug)]
pub struct CanonicalizeOptions {
    pub expansion: ExpansionOptions,
    pub max_work: u64,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            expansion: ExpansionOptions::default(),
            max_work: DEFAULT_MAX_WORK,
        }
    }
}

/// Converts JSON-LD to canonical N-Quads format
///
/// # Arguments
/// * `jsonld` - JSON-LD document as a serde_json::Value
/// * `resolver` - Resolves the contexts the document references
///
/// # Returns
/// Canonical N-Quads (URDNA2015), sorted, each line terminated by `" .\n"`
pub async fn canon_nquads_from_jsonld(
    jsonld: &Value,
    resolver: &ContextResolver,
    options: &CanonicalizeOptions,
) -> Result<String, SealError> {
    let quads = expand_to_quads(jsonld, resolver, &options.expansion).await?;

    if quads.is_empty() {
        return Err(CanonicalizationError::InvalidStructure(
            "document expands to an empty dataset".to_owned(),
        )
        .into());
    }

    Ok(nquads::canonicalize_quads(quads, options.max_work)?)
}

/// Computes RDFC CID for JSON-LD data
///
/// Converts JSON-LD to N-Quads, canonicalizes using URDNA2015, and computes a CID.
///
/// # Returns
/// Tuple of (CID string, canonicalized N-Quads bytes)
pub async fn compute_rdfc_cid_for_jsonld(
    jsonld: &Value,
    resolver: &ContextResolver,
    options: &CanonicalizeOptions,
    scheme: CidScheme,
) -> Result<(String, Vec<u8>), SealError> {
    let canon_nquads = canon_nquads_from_jsonld(jsonld, resolver, options).await?;

    let cid = scheme.derive(canon_nquads.as_bytes())?;

    Ok((cid, canon_nquads.into_bytes()))
}
