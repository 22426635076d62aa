use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::StoreError,
    object_store::{
        prepare_put, validate_cid, validate_namespace, HistoryEntry, ObjectMeta, ObjectStore,
        DEFAULT_ID_SCHEME,
    },
    signer::SignatureMetadata,
};

struct StoredObject {
    raw: Vec<u8>,
    canonical: Vec<u8>,
    meta: ObjectMeta,
    signature: Option<SignatureMetadata>,
}

#[derive(Default)]
struct Namespace {
    latest: Option<String>,
    history: Vec<HistoryEntry>,
}

/// In-memory object storage for testing
///
/// Not persistent. Used for testing and development.
pub struct InMemoryStore {
    id_scheme: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    namespaces: Mutex<HashMap<(String, String), Namespace>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            id_scheme: DEFAULT_ID_SCHEME.to_owned(),
            objects: RwLock::new(HashMap::new()),
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_id_scheme(mut self, id_scheme: impl Into<String>) -> Self {
        self.id_scheme = id_scheme.into();
        self
    }

    async fn read<T>(
        &self,
        cid: &str,
        f: impl FnOnce(&StoredObject) -> T + Send,
    ) -> Result<T, StoreError> {
        validate_cid(cid)?;

        let objects = self.objects.read().await;
        objects
            .get(cid)
            .map(f)
            .ok_or_else(|| StoreError::NotFound(cid.to_owned()))
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn init(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn exists(&self, cid: &str) -> Result<bool, StoreError> {
        log::trace!("check exists {cid}.");
        validate_cid(cid)?;

        Ok(self.objects.read().await.contains_key(cid))
    }

    async fn put(
        &self,
        cid: &str,
        raw: &[u8],
        canonical: &[u8],
        owner: Option<&str>,
    ) -> Result<(), StoreError> {
        let document = prepare_put(cid, raw, canonical, owner, &self.id_scheme)?;

        log::trace!("put {cid}. document size: {}", document.len());

        let mut objects = self.objects.write().await;
        if objects.contains_key(cid) {
            log::debug!("object with cid {cid} already exists.");
            return Ok(());
        }

        objects.insert(
            cid.to_owned(),
            StoredObject {
                raw: document,
                canonical: canonical.to_vec(),
                meta: ObjectMeta {
                    created_at: Utc::now(),
                    owner: owner.map(ToOwned::to_owned),
                },
                signature: None,
            },
        );
        Ok(())
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, StoreError> {
        log::trace!("get {cid}.");
        self.read(cid, |object| object.raw.clone()).await
    }

    async fn get_canonical(&self, cid: &str) -> Result<Vec<u8>, StoreError> {
        self.read(cid, |object| object.canonical.clone()).await
    }

    async fn get_meta(&self, cid: &str) -> Result<ObjectMeta, StoreError> {
        self.read(cid, |object| object.meta.clone()).await
    }

    async fn put_signature(
        &self,
        cid: &str,
        signature: &SignatureMetadata,
    ) -> Result<(), StoreError> {
        validate_cid(cid)?;

        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(cid)
            .ok_or_else(|| StoreError::NotFound(cid.to_owned()))?;
        object.signature = Some(signature.clone());
        Ok(())
    }

    async fn get_signature(&self, cid: &str) -> Result<Option<SignatureMetadata>, StoreError> {
        self.read(cid, |object| object.signature.clone()).await
    }

    async fn delete(&self, cid: &str) -> Result<(), StoreError> {
        log::trace!("delete {cid}.");
        validate_cid(cid)?;

        self.objects.write().await.remove(cid);
        Ok(())
    }

    async fn update_latest(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        validate_namespace(owner, slug)?;
        validate_cid(cid)?;

        let mut namespaces = self.namespaces.lock().await;
        namespaces
            .entry((owner.to_owned(), slug.to_owned()))
            .or_default()
            .latest = Some(cid.to_owned());
        Ok(())
    }

    async fn read_latest(&self, owner: &str, slug: &str) -> Result<String, StoreError> {
        validate_namespace(owner, slug)?;

        let namespaces = self.namespaces.lock().await;
        namespaces
            .get(&(owner.to_owned(), slug.to_owned()))
            .and_then(|namespace| namespace.latest.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{owner}/{slug}")))
    }

    async fn append_history(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        validate_namespace(owner, slug)?;
        validate_cid(cid)?;

        let mut namespaces = self.namespaces.lock().await;
        namespaces
            .entry((owner.to_owned(), slug.to_owned()))
            .or_default()
            .history
            .push(HistoryEntry {
                cid: cid.to_owned(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn read_history(&self, owner: &str, slug: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        validate_namespace(owner, slug)?;

        let namespaces = self.namespaces.lock().await;
        Ok(namespaces
            .get(&(owner.to_owned(), slug.to_owned()))
            .map(|namespace| namespace.history.clone())
            .unwrap_or_default())
    }
}
