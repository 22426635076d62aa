use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cid::{parse_cid, prepend_id_scheme, CidScheme},
    error::StoreError,
    signer::SignatureMetadata,
};

pub mod in_memory;
pub mod local_fs;

pub use in_memory::InMemoryStore;
pub use local_fs::LocalFs;

/// Scheme of the `@id` injected into stored documents unless configured
/// otherwise.
pub const DEFAULT_ID_SCHEME: &str = "ipfs";

/// Longest accepted identifier, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Bookkeeping written once alongside each sealed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub created_at: DateTime<Utc>,
    pub owner: Option<String>,
}

/// One published version in an (owner, slug) namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub cid: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence for sealed objects, keyed by CID, plus the per-(owner, slug)
/// latest pointer and history log.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Initialize the store
    async fn init(&mut self) -> Result<(), StoreError>;

    /// Check if a CID exists in the store
    async fn exists(&self, cid: &str) -> Result<bool, StoreError>;

    /// Stores a sealed object.
    ///
    /// `cid` must be the identifier of `canonical` under the scheme `cid`
    /// itself names. `raw` must be a JSON object; the stored copy carries an
    /// injected `@id`. Putting a CID that is already present is a no-op.
    async fn put(
        &self,
        cid: &str,
        raw: &[u8],
        canonical: &[u8],
        owner: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Raw document with its injected `@id`.
    async fn get(&self, cid: &str) -> Result<Vec<u8>, StoreError>;

    /// Canonical N-Quads the CID was derived from.
    async fn get_canonical(&self, cid: &str) -> Result<Vec<u8>, StoreError>;

    async fn get_meta(&self, cid: &str) -> Result<ObjectMeta, StoreError>;

    /// Attaches a detached signature, replacing any previous one.
    async fn put_signature(
        &self,
        cid: &str,
        signature: &SignatureMetadata,
    ) -> Result<(), StoreError>;

    async fn get_signature(&self, cid: &str) -> Result<Option<SignatureMetadata>, StoreError>;

    /// Removes an object and everything stored alongside it. Deleting an
    /// absent object succeeds.
    async fn delete(&self, cid: &str) -> Result<(), StoreError>;

    async fn update_latest(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError>;

    async fn read_latest(&self, owner: &str, slug: &str) -> Result<String, StoreError>;

    async fn append_history(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError>;

    /// Oldest first. Unknown namespaces have an empty history.
    async fn read_history(&self, owner: &str, slug: &str) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Appends `cid` to the namespace history and makes it the latest.
    async fn publish(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        self.append_history(owner, slug, cid).await?;
        self.update_latest(owner, slug, cid).await
    }
}

/// Checks that `id` is safe to use as a single path component.
pub fn validate_identifier(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_IDENTIFIER_LENGTH
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'@' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(id.to_owned()))
    }
}

/// An identifier that additionally parses as a CID.
pub fn validate_cid(cid: &str) -> Result<(), StoreError> {
    validate_identifier(cid)?;
    parse_cid(cid).map_err(|_| StoreError::InvalidIdentifier(cid.to_owned()))?;
    Ok(())
}

/// Recomputes the CID of `canonical` under the scheme `expected_cid` names.
/// Returns Ok(scheme) if the computed cid matches the expected cid.
fn calc_and_validate_cid(canonical: &[u8], expected_cid: &str) -> Result<CidScheme, StoreError> {
    let scheme = CidScheme::of(expected_cid)?;
    let computed_cid = scheme.derive(canonical)?;

    if computed_cid != expected_cid {
        return Err(StoreError::CidMismatch {
            computed: computed_cid,
            provided: expected_cid.to_owned(),
        });
    }
    Ok(scheme)
}

/// Copy of `raw` with `@id` set to `<id_scheme>://<cid>`.
fn inject_id(raw: &[u8], cid: &str, id_scheme: &str) -> Result<Vec<u8>, StoreError> {
    let mut document: Value = serde_json::from_slice(raw)
        .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;

    let object = document
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidDocument("top-level value is not an object".to_owned()))?;
    object.insert(
        "@id".to_owned(),
        Value::String(prepend_id_scheme(cid, id_scheme)?),
    );

    Ok(serde_json::to_vec(&document)?)
}

/// Validation shared by every `put`: returns the document to persist.
fn prepare_put(
    cid: &str,
    raw: &[u8],
    canonical: &[u8],
    owner: Option<&str>,
    id_scheme: &str,
) -> Result<Vec<u8>, StoreError> {
    validate_cid(cid)?;
    if let Some(owner) = owner {
        validate_identifier(owner)?;
    }
    calc_and_validate_cid(canonical, cid)?;
    inject_id(raw, cid, id_scheme)
}

fn validate_namespace(owner: &str, slug: &str) -> Result<(), StoreError> {
    validate_identifier(owner)?;
    validate_identifier(slug)
}
