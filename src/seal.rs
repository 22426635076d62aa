//! The sealing pipeline: raw document in, content identifier out.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::{
    cid::CidScheme,
    config::SealConfig,
    error::{ConfigError, SealError},
    json_ld::{canon_nquads_from_jsonld, loader::ContextResolver, CanonicalizeOptions},
    object_store::ObjectStore,
    signer::{SignatureMetadata, Signer, SigningMode},
};

/// Result of sealing a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub cid: String,
    /// Canonical N-Quads the CID was derived from.
    pub canonical: String,
}

/// What [`Sealer::seal_and_store`] does beyond storing the object.
#[derive(Clone, Copy, Default)]
pub struct SealOptions<'a> {
    /// Recorded in the object metadata, and the history namespace owner.
    pub owner: Option<&'a str>,
    /// With `owner`, appends the CID to the namespace history and makes it
    /// the latest.
    pub slug: Option<&'a str>,
    pub signer: Option<&'a dyn Signer>,
    pub mode: SigningMode,
}

/// Outcome of [`Sealer::seal_and_store`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealReceipt {
    pub cid: String,
    pub canonical: String,
    pub signature: Option<SignatureMetadata>,
    /// Whether the CID was published to an (owner, slug) namespace.
    pub published: bool,
}

/// Seals JSON-LD documents with one resolver and one set of options.
#[derive(Clone)]
pub struct Sealer {
    resolver: Arc<ContextResolver>,
    options: CanonicalizeOptions,
    cid_scheme: CidScheme,
}

impl Sealer {
    pub fn new(resolver: Arc<ContextResolver>) -> Self {
        Self {
            resolver,
            options: CanonicalizeOptions::default(),
            cid_scheme: CidScheme::default(),
        }
    }

    pub fn from_config(config: &SealConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(config.build_resolver()?))
            .with_options(config.canonicalize_options())
            .with_cid_scheme(config.cid_scheme))
    }

    pub fn with_options(mut self, options: CanonicalizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cid_scheme(mut self, cid_scheme: CidScheme) -> Self {
        self.cid_scheme = cid_scheme;
        self
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    /// Parses `raw` as JSON and seals it.
    pub async fn seal(&self, raw: &[u8]) -> Result<Sealed, SealError> {
        let document: Value = serde_json::from_slice(raw)?;
        self.seal_value(&document).await
    }

    /// Seals an already parsed document. The document is not modified.
    pub async fn seal_value(&self, document: &Value) -> Result<Sealed, SealError> {
        let canonical = canon_nquads_from_jsonld(document, &self.resolver, &self.options).await?;
        let cid = self.cid_scheme.derive(canonical.as_bytes())?;

        debug!("sealed document as {cid}");
        Ok(Sealed { cid, canonical })
    }

    /// Seals `raw`, stores it, and optionally signs and publishes it.
    ///
    /// Signing happens after the object is stored, so a signing failure
    /// leaves an unsigned object behind.
    pub async fn seal_and_store(
        &self,
        store: &dyn ObjectStore,
        raw: &[u8],
        options: SealOptions<'_>,
    ) -> Result<SealReceipt, SealError> {
        let Sealed { cid, canonical } = self.seal(raw).await?;

        store
            .put(&cid, raw, canonical.as_bytes(), options.owner)
            .await?;

        let signature = match options.signer {
            Some(signer) => {
                let metadata = signer
                    .sign_metadata(canonical.as_bytes(), options.mode)
                    .await?;
                store.put_signature(&cid, &metadata).await?;
                Some(metadata)
            }
            None => None,
        };

        let published = match (options.owner, options.slug) {
            (Some(owner), Some(slug)) => {
                store.publish(owner, slug, &cid).await?;
                true
            }
            (None, Some(slug)) => {
                warn!("slug '{slug}' given without an owner; not publishing {cid}");
                false
            }
            _ => false,
        };

        Ok(SealReceipt {
            cid,
            canonical,
            signature,
            published,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        error::{CanonicalizationError, StoreError},
        object_store::InMemoryStore,
        signer::Secp256k1Signer,
    };

    fn sealer() -> Sealer {
        Sealer::new(Arc::new(ContextResolver::offline(None).unwrap()))
    }

    const PERSON: &str = r#"{
        "@context": {"name": "http://schema.org/name", "knows": {"@id": "http://schema.org/knows", "@type": "@id"}},
        "@id": "http://example.org/alice",
        "name": "Alice",
        "knows": "http://example.org/bob"
    }"#;

    #[tokio::test]
    async fn sealing_is_deterministic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sealer = sealer();

        let first = sealer.seal(PERSON.as_bytes()).await.unwrap();
        let second = sealer.seal(PERSON.as_bytes()).await.unwrap();
        assert_eq!(first, second);

        // key order and whitespace do not matter
        let reordered = r#"{"knows":"http://example.org/bob","name":"Alice","@id":"http://example.org/alice","@context":{"knows":{"@type":"@id","@id":"http://schema.org/knows"},"name":"http://schema.org/name"}}"#;
        assert_eq!(sealer.seal(reordered.as_bytes()).await.unwrap(), first);

        // neither does a parse and re-serialize cycle
        let value: Value = serde_json::from_str(PERSON).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert_eq!(sealer.seal(&pretty).await.unwrap(), first);
        assert_eq!(sealer.seal_value(&value).await.unwrap(), first);
    }

    #[tokio::test]
    async fn different_graphs_get_different_cids() {
        let sealer = sealer();
        let alice = sealer.seal(PERSON.as_bytes()).await.unwrap();
        let renamed = sealer
            .seal(PERSON.replace("\"Alice\"", "\"Alicia\"").as_bytes())
            .await
            .unwrap();

        assert_ne!(alice.canonical, renamed.canonical);
        assert_ne!(alice.cid, renamed.cid);
    }

    #[tokio::test]
    async fn petri_net_seals_to_one_cid() {
        let sealer = sealer();
        let net = json!({
            "@context": "https://pflow.xyz/schema",
            "@type": "PetriNet",
            "@version": "1.1",
            "arcs": [],
            "places": {},
            "token": ["https://pflow.xyz/tokens/black"],
            "transitions": {}
        });
        let compact = serde_json::to_vec(&net).unwrap();

        let first = sealer.seal(&compact).await.unwrap();
        let second = sealer.seal(&compact).await.unwrap();
        let third = sealer
            .seal(serde_json::to_string_pretty(&net).unwrap().as_bytes())
            .await
            .unwrap();

        assert_eq!(first.cid, second.cid);
        assert_eq!(first.cid, third.cid);
        assert!(first.cid.starts_with('z'));
        assert_eq!(CidScheme::of(&first.cid).unwrap(), CidScheme::RdfcBlake3Base58);
    }

    #[tokio::test]
    async fn schema_org_name_literal() {
        let sealed = sealer()
            .seal(br#"{"@context":{"name":"http://schema.org/name"},"name":"Test"}"#)
            .await
            .unwrap();

        assert!(sealed.canonical.contains("\"Test\""));
        assert!(sealed
            .canonical
            .lines()
            .all(|line| line.ends_with(" .")));
        assert_eq!(
            sealed.canonical,
            "_:c14n0 <http://schema.org/name> \"Test\" .\n"
        );
    }

    #[tokio::test]
    async fn legacy_scheme() {
        let sealed = sealer()
            .with_cid_scheme(CidScheme::RawSha256Base32)
            .seal(PERSON.as_bytes())
            .await
            .unwrap();

        assert!(sealed.cid.starts_with("bafkrei"));
    }

    #[tokio::test]
    async fn input_errors() {
        let sealer = sealer();

        let err = sealer.seal(b"{not json").await.unwrap_err();
        assert!(matches!(err, SealError::Parse(_)));
        assert!(err.is_client_error());

        let err = sealer.seal(b"42").await.unwrap_err();
        assert!(matches!(
            err,
            SealError::Canonicalization(CanonicalizationError::InvalidStructure(_))
        ));

        let err = sealer
            .seal(br#"{"@context":"https://example.com/unknown","name":"x"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::ContextResolution(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn seal_and_store_signs_and_publishes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sealer = sealer();
        let store = InMemoryStore::new();
        let signer = Secp256k1Signer::create().unwrap();

        let receipt = sealer
            .seal_and_store(
                &store,
                PERSON.as_bytes(),
                SealOptions {
                    owner: Some("alice"),
                    slug: Some("profile"),
                    signer: Some(&signer),
                    mode: SigningMode::PersonalMessage,
                },
            )
            .await
            .unwrap();

        assert!(receipt.published);
        let stored: Value = serde_json::from_slice(&store.get(&receipt.cid).await.unwrap()).unwrap();
        assert_eq!(stored["@id"], format!("ipfs://{}", receipt.cid));

        let signature = store.get_signature(&receipt.cid).await.unwrap().unwrap();
        assert_eq!(Some(&signature), receipt.signature.as_ref());
        assert!(signature.use_personal_sign);
        assert_eq!(signature.signer_address, signer.address());
        assert!(signature.verify(receipt.canonical.as_bytes()).unwrap());

        assert_eq!(store.read_latest("alice", "profile").await.unwrap(), receipt.cid);

        // resealing the same input leaves the namespace alone
        let again = sealer
            .seal_and_store(&store, PERSON.as_bytes(), SealOptions::default())
            .await
            .unwrap();
        assert_eq!(again.cid, receipt.cid);
        assert!(!again.published);
        assert_eq!(store.read_history("alice", "profile").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn seal_and_store_requires_an_object() {
        let store = InMemoryStore::new();
        let err = sealer()
            .seal_and_store(
                &store,
                br#"[{"@id":"http://example.org/a","http://schema.org/name":"a"}]"#,
                SealOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SealError::Store(StoreError::InvalidDocument(_))));
    }
}
