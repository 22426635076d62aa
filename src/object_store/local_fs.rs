use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::{
    error::StoreError,
    object_store::{
        prepare_put, validate_cid, validate_namespace, HistoryEntry, ObjectMeta, ObjectStore,
        DEFAULT_ID_SCHEME,
    },
    signer::SignatureMetadata,
};

const OBJECTS_DIR: &str = "objects";
const NAMES_DIR: &str = "names";

/// Filesystem store.
///
/// ```text
/// objects/<cid>.jsonld      raw document with injected @id
/// objects/<cid>.nq          canonical N-Quads
/// objects/<cid>.meta.json   ObjectMeta
/// objects/<cid>.sig.json    SignatureMetadata
/// names/<owner>/<slug>/latest
/// names/<owner>/<slug>/history.json
/// ```
///
/// Every file is written to a temporary file in its final directory and
/// renamed into place. The raw document is written last and is what marks an
/// object as present.
pub struct LocalFs {
    path: PathBuf,
    id_scheme: String,
    namespace_locks: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalFs {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            id_scheme: DEFAULT_ID_SCHEME.to_owned(),
            namespace_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Scheme used for the injected `@id` (`<scheme>://<cid>`).
    pub fn with_id_scheme(mut self, id_scheme: impl Into<String>) -> Self {
        self.id_scheme = id_scheme.into();
        self
    }

    fn object_path(&self, cid: &str, extension: &str) -> PathBuf {
        self.path.join(OBJECTS_DIR).join(format!("{cid}.{extension}"))
    }

    fn raw_path(&self, cid: &str) -> PathBuf {
        self.object_path(cid, "jsonld")
    }

    fn canonical_path(&self, cid: &str) -> PathBuf {
        self.object_path(cid, "nq")
    }

    fn meta_path(&self, cid: &str) -> PathBuf {
        self.object_path(cid, "meta.json")
    }

    fn signature_path(&self, cid: &str) -> PathBuf {
        self.object_path(cid, "sig.json")
    }

    fn namespace_path(&self, owner: &str, slug: &str) -> PathBuf {
        self.path.join(NAMES_DIR).join(owner).join(slug)
    }

    fn namespace_lock(&self, owner: &str, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .namespace_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((owner.to_owned(), slug.to_owned()))
            .or_default()
            .clone()
    }

    /// Runs `write` under the lock of one namespace. The lock entry is
    /// dropped afterwards unless another task still holds it.
    async fn with_namespace_lock<T>(
        &self,
        owner: &str,
        slug: &str,
        write: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = self.namespace_lock(owner, slug);
        let result = {
            let _guard = lock.lock().await;
            write()
        };
        drop(lock);

        let key = (owner.to_owned(), slug.to_owned());
        let mut locks = self
            .namespace_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }

        result
    }

    /// Reads an object artifact, mapping a missing file to `NotFound`.
    fn read_artifact(&self, cid: &str, path: &Path) -> Result<Vec<u8>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(cid.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, cid: &str, path: &Path) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(&self.read_artifact(cid, path)?)?)
    }

    fn write_latest(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        let dir = self.namespace_path(owner, slug);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join("latest"), cid.as_bytes())
    }

    fn write_history_entry(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        let dir = self.namespace_path(owner, slug);
        fs::create_dir_all(&dir)?;

        let path = dir.join("history.json");
        let mut history = read_history_file(&path)?;
        history.push(HistoryEntry {
            cid: cid.to_owned(),
            created_at: Utc::now(),
        });

        write_json(&path, &history)
    }
}

/// Writes `bytes` next to `path` and renames over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

fn read_history_file(path: &Path) -> Result<Vec<HistoryEntry>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Removes a secondary artifact; failures are logged, never returned.
fn remove_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove {}: {e}", path.display());
        }
    }
}

#[async_trait]
impl ObjectStore for LocalFs {
    async fn init(&mut self) -> Result<(), StoreError> {
        fs::create_dir_all(self.path.join(OBJECTS_DIR))?;
        fs::create_dir_all(self.path.join(NAMES_DIR))?;
        Ok(())
    }

    async fn exists(&self, cid: &str) -> Result<bool, StoreError> {
        trace!("check exists {cid}.");
        validate_cid(cid)?;

        Ok(self.raw_path(cid).exists())
    }

    async fn put(
        &self,
        cid: &str,
        raw: &[u8],
        canonical: &[u8],
        owner: Option<&str>,
    ) -> Result<(), StoreError> {
        let document = prepare_put(cid, raw, canonical, owner, &self.id_scheme)?;

        trace!("put {cid}. document size: {}", document.len());

        let raw_path = self.raw_path(cid);
        if raw_path.exists() {
            debug!("object with cid {cid} already exists.");
            return Ok(());
        }

        fs::create_dir_all(self.path.join(OBJECTS_DIR))?;
        write_atomic(&self.canonical_path(cid), canonical)?;
        write_json(
            &self.meta_path(cid),
            &ObjectMeta {
                created_at: Utc::now(),
                owner: owner.map(ToOwned::to_owned),
            },
        )?;
        // a previous delete may have left a signature behind
        remove_best_effort(&self.signature_path(cid));
        write_atomic(&raw_path, &document)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, StoreError> {
        trace!("get {cid}.");
        validate_cid(cid)?;

        self.read_artifact(cid, &self.raw_path(cid))
    }

    async fn get_canonical(&self, cid: &str) -> Result<Vec<u8>, StoreError> {
        trace!("get canonical {cid}.");
        validate_cid(cid)?;

        if !self.raw_path(cid).exists() {
            return Err(StoreError::NotFound(cid.to_owned()));
        }
        self.read_artifact(cid, &self.canonical_path(cid))
    }

    async fn get_meta(&self, cid: &str) -> Result<ObjectMeta, StoreError> {
        validate_cid(cid)?;

        if !self.raw_path(cid).exists() {
            return Err(StoreError::NotFound(cid.to_owned()));
        }
        self.read_json(cid, &self.meta_path(cid))
    }

    async fn put_signature(
        &self,
        cid: &str,
        signature: &SignatureMetadata,
    ) -> Result<(), StoreError> {
        trace!("put signature {cid} from {}.", signature.signer_address);
        validate_cid(cid)?;

        if !self.raw_path(cid).exists() {
            return Err(StoreError::NotFound(cid.to_owned()));
        }
        write_json(&self.signature_path(cid), signature)
    }

    async fn get_signature(&self, cid: &str) -> Result<Option<SignatureMetadata>, StoreError> {
        validate_cid(cid)?;

        if !self.raw_path(cid).exists() {
            return Err(StoreError::NotFound(cid.to_owned()));
        }
        match self.read_json(cid, &self.signature_path(cid)) {
            Ok(signature) => Ok(Some(signature)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, cid: &str) -> Result<(), StoreError> {
        trace!("delete {cid}.");
        validate_cid(cid)?;

        match fs::remove_file(self.raw_path(cid)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("object with cid {cid} already absent.");
            }
            Err(e) => return Err(e.into()),
        }

        remove_best_effort(&self.canonical_path(cid));
        remove_best_effort(&self.meta_path(cid));
        remove_best_effort(&self.signature_path(cid));
        Ok(())
    }

    async fn update_latest(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        validate_namespace(owner, slug)?;
        validate_cid(cid)?;

        self.with_namespace_lock(owner, slug, || self.write_latest(owner, slug, cid))
            .await
    }

    async fn read_latest(&self, owner: &str, slug: &str) -> Result<String, StoreError> {
        validate_namespace(owner, slug)?;

        let path = self.namespace_path(owner, slug).join("latest");
        match fs::read_to_string(path) {
            Ok(cid) => Ok(cid.trim().to_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{owner}/{slug}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_history(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        validate_namespace(owner, slug)?;
        validate_cid(cid)?;
        trace!("append {cid} to {owner}/{slug}.");

        self.with_namespace_lock(owner, slug, || self.write_history_entry(owner, slug, cid))
            .await
    }

    async fn read_history(&self, owner: &str, slug: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        validate_namespace(owner, slug)?;

        read_history_file(&self.namespace_path(owner, slug).join("history.json"))
    }

    async fn publish(&self, owner: &str, slug: &str, cid: &str) -> Result<(), StoreError> {
        validate_namespace(owner, slug)?;
        validate_cid(cid)?;

        self.with_namespace_lock(owner, slug, || {
            self.write_history_entry(owner, slug, cid)?;
            self.write_latest(owner, slug, cid)
        })
        .await
    }
}
