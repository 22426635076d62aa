//! Error taxonomy for the sealing pipeline.
//!
//! Every stage has its own error type; [`SealError`] is what the pipeline
//! entry points return and is what an HTTP layer maps to status codes.

use thiserror::Error;

/// A `@context` reference could not be turned into a context document.
#[derive(Clone, Debug, Error)]
#[error("failed to resolve context '{url}': {reason}")]
pub struct ContextResolutionError {
    /// The context reference that failed.
    pub url: String,
    /// Human readable cause.
    pub reason: String,
}

impl ContextResolutionError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Expansion or canonical labeling failed. Retrying the same input fails the
/// same way.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalizationError {
    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("cyclic term definition: {0}")]
    CyclicTermDefinition(String),

    #[error("unresolvable term: {0}")]
    UnresolvableTerm(String),

    #[error("invalid IRI: {0}")]
    InvalidIri(String),

    #[error("malformed literal: {0}")]
    MalformedLiteral(String),

    #[error("invalid JSON-LD structure: {0}")]
    InvalidStructure(String),

    #[error("invalid N-Quads at line {line}: {reason}")]
    InvalidNQuads { line: usize, reason: String },

    #[error("graph too complex: canonical labeling exceeded a work budget of {budget}")]
    TooComplex { budget: u64 },
}

/// Errors from deriving or parsing content identifiers.
#[derive(Debug, Error)]
pub enum CidError {
    #[error("cannot derive an identifier from empty input")]
    EmptyInput,

    #[error("invalid CID '{cid}': {reason}")]
    Invalid { cid: String, reason: String },

    #[error("CID '{cid}' uses codec {codec:#x} with hash {hash:#x}, which is not a known scheme")]
    UnknownScheme { cid: String, codec: u64, hash: u64 },
}

/// Errors from the sealed-object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("computed CID '{computed}' doesn't match provided CID '{provided}'")]
    CidMismatch { computed: String, provided: String },

    #[error("raw document must be a JSON object: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Cid(#[from] CidError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed signatures or keys. A well-formed signature that does not match
/// is not an error.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed signature encoding: {0}")]
    Encoding(String),

    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),

    #[error("invalid recovery byte {0}")]
    RecoveryId(u8),

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// A signer key file could not be written or read back.
#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("key file is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("key file does not hold a signer: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration could not be loaded or applied.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Context(#[from] ContextResolutionError),
}

/// Top-level error of the sealing pipeline.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    ContextResolution(#[from] ContextResolutionError),

    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Cid(#[from] CidError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl SealError {
    /// The request itself is at fault; resubmitting it will fail again.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SealError::Parse(_)
                | SealError::Canonicalization(_)
                | SealError::Signature(_)
                | SealError::Cid(_)
                | SealError::Store(StoreError::InvalidIdentifier(_))
                | SealError::Store(StoreError::InvalidDocument(_))
                | SealError::Store(StoreError::CidMismatch { .. })
        )
    }

    /// The failure depends on external state and may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SealError::ContextResolution(_) | SealError::Store(StoreError::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let parse: SealError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(parse.is_client_error());
        assert!(!parse.is_retryable());

        let ctx: SealError = ContextResolutionError::new("https://example.com/ctx", "timed out").into();
        assert!(ctx.is_retryable());
        assert!(!ctx.is_client_error());

        let canon: SealError = CanonicalizationError::TooComplex { budget: 10 }.into();
        assert!(canon.is_client_error());
        assert_eq!(
            canon.to_string(),
            "graph too complex: canonical labeling exceeded a work budget of 10"
        );

        let missing: SealError = StoreError::NotFound("zabc".to_owned()).into();
        assert!(!missing.is_client_error());
        assert!(!missing.is_retryable());
    }
}
