//! Content-addressed sealing of JSON-LD documents.
//!
//! A document is expanded to RDF, canonicalized with URDNA2015, and named by
//! a CID derived from the canonical N-Quads. Sealed objects are kept in an
//! [`object_store::ObjectStore`] and may carry a detached secp256k1
//! signature over the canonical bytes.

/// Content Identifier (CID) utilities and encoding
pub mod cid;

/// Runtime configuration
pub mod config;

/// Error types for every stage of the pipeline
pub mod error;

/// JSON-LD processing and canonicalization
pub mod json_ld;

/// N-Quads RDF format and URDNA2015 canonical labeling
pub mod nquads;

/// Sealed object storage backends (local filesystem, in-memory)
pub mod object_store;

/// Seal, store, sign and publish in one call
pub mod seal;

/// secp256k1 signing and verification over canonical bytes
pub mod signer;

pub use error::SealError;
pub use seal::{SealOptions, SealReceipt, Sealed, Sealer};
