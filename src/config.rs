//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration file.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    cid::CidScheme,
    error::ConfigError,
    json_ld::{loader::ContextResolver, CanonicalizeOptions, ExpansionOptions, DEFAULT_MAX_WORK},
    object_store::{LocalFs, DEFAULT_ID_SCHEME},
};

fn default_true() -> bool {
    true
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Scheme of the `@id` injected into stored documents.
    pub id_scheme: String,

    /// Scheme used to derive new identifiers.
    pub cid_scheme: CidScheme,

    pub canonicalization: CanonicalizationConfig,

    pub contexts: ContextsConfig,

    pub store: StoreConfig,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            id_scheme: DEFAULT_ID_SCHEME.to_owned(),
            cid_scheme: CidScheme::default(),
            canonicalization: CanonicalizationConfig::default(),
            contexts: ContextsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Canonicalization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizationConfig {
    /// Budget of Hash N-Degree Quads calls during labeling.
    #[serde(default = "default_max_work")]
    pub max_work: u64,

    /// Reject properties that do not expand to an IRI instead of dropping
    /// them.
    #[serde(default = "default_true")]
    pub strict: bool,
}

fn default_max_work() -> u64 {
    DEFAULT_MAX_WORK
}

impl Default for CanonicalizationConfig {
    fn default() -> Self {
        Self {
            max_work: DEFAULT_MAX_WORK,
            strict: true,
        }
    }
}

/// Context resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextsConfig {
    /// Fetch contexts that are neither bundled nor listed in `additional`.
    #[serde(default = "default_true")]
    pub allow_remote: bool,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Context URL to the path of a JSON file holding its document.
    #[serde(default)]
    pub additional: HashMap<String, PathBuf>,
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            allow_remote: true,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            additional: HashMap::new(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base storage directory
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

impl SealConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_file(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn canonicalize_options(&self) -> CanonicalizeOptions {
        CanonicalizeOptions {
            expansion: ExpansionOptions {
                base: None,
                strict: self.canonicalization.strict,
            },
            max_work: self.canonicalization.max_work,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.contexts.fetch_timeout_ms)
    }

    /// Builds a resolver with the bundled contexts, the configured
    /// additional contexts and, when allowed and compiled in, HTTP fetching.
    pub fn build_resolver(&self) -> Result<ContextResolver, ConfigError> {
        let additional = self
            .contexts
            .additional
            .iter()
            .map(|(url, path)| Ok((url.clone(), read_file(path)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        let resolver = ContextResolver::offline(Some(additional))?;

        if self.contexts.allow_remote {
            return Ok(self.with_remote(resolver));
        }
        Ok(resolver)
    }

    #[cfg(feature = "remote-contexts")]
    fn with_remote(&self, resolver: ContextResolver) -> ContextResolver {
        resolver.with_fetcher(
            std::sync::Arc::new(crate::json_ld::loader::HttpFetcher::new()),
            self.fetch_timeout(),
        )
    }

    #[cfg(not(feature = "remote-contexts"))]
    fn with_remote(&self, resolver: ContextResolver) -> ContextResolver {
        log::warn!("remote contexts requested but not compiled in; resolving offline");
        resolver
    }

    /// Filesystem store rooted at `store.root`, not yet initialized.
    pub fn local_store(&self) -> LocalFs {
        LocalFs::new(self.store.root.clone()).with_id_scheme(self.id_scheme.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let config = SealConfig::from_file(&path).unwrap();
        assert_eq!(config, SealConfig::default());
        assert_eq!(config.id_scheme, "ipfs");
        assert_eq!(config.cid_scheme, CidScheme::RdfcBlake3Base58);
        assert_eq!(config.canonicalization.max_work, 100_000);
        assert!(config.canonicalization.strict);
        assert!(config.contexts.allow_remote);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.store.root, PathBuf::from("./data"));
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let config: SealConfig = serde_json::from_str(
            r#"{
                "cid_scheme": "raw-sha256-base32",
                "canonicalization": {"strict": false},
                "contexts": {"allow_remote": false}
            }"#,
        )
        .unwrap();

        assert_eq!(config.cid_scheme, CidScheme::RawSha256Base32);
        assert!(!config.canonicalization.strict);
        assert_eq!(config.canonicalization.max_work, DEFAULT_MAX_WORK);
        assert_eq!(config.contexts.fetch_timeout_ms, 10_000);

        let options = config.canonicalize_options();
        assert!(!options.expansion.strict);
        assert_eq!(options.max_work, DEFAULT_MAX_WORK);
    }

    #[tokio::test]
    async fn resolver_loads_additional_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let context_path = dir.path().join("ctx.json");
        fs::write(
            &context_path,
            r#"{"@context": {"name": "http://schema.org/name"}}"#,
        )
        .unwrap();

        let mut config = SealConfig::default();
        config.contexts.allow_remote = false;
        config
            .contexts
            .additional
            .insert("https://example.com/ctx".to_owned(), context_path);

        let resolver = config.build_resolver().unwrap();
        assert!(!resolver.allows_remote());
        assert!(resolver.resolve("https://example.com/ctx").await.is_ok());
    }

    #[test]
    fn missing_files_are_reported() {
        assert!(matches!(
            SealConfig::from_file("/nonexistent/config.json"),
            Err(ConfigError::Io { .. })
        ));

        let mut config = SealConfig::default();
        config
            .contexts
            .additional
            .insert("https://example.com/ctx".to_owned(), "/nonexistent/ctx.json".into());
        assert!(matches!(config.build_resolver(), Err(ConfigError::Io { .. })));
    }
}
