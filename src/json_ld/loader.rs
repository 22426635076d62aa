use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use iref::IriBuf;
use json_ld::{loader::Loader, syntax, syntax::Parse, RemoteDocument};
use locspan::{Meta, Span};
use log::{debug, trace, warn};
use once_cell::sync::OnceCell;
use rdf_types::vocabulary::IriVocabularyMut;
use serde_json::Value;

use crate::error::ContextResolutionError;

type ContextMap = HashMap<String, &'static str>;

type Result<T> = std::result::Result<T, ContextResolutionError>;

/// Upper bound on distinct context documents a single document may pull in.
pub const MAX_CONTEXTS: usize = 64;

/// Fetches the body of a remote context document.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches contexts over HTTP(S).
#[cfg(feature = "remote-contexts")]
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "remote-contexts")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "remote-contexts")]
#[async_trait]
impl ContextFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/ld+json, application/json",
            )
            .send()
            .await
            .map_err(|e| ContextResolutionError::new(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContextResolutionError::new(url, format!("HTTP status {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ContextResolutionError::new(url, e.to_string()))
    }
}

/// Resolves `@context` references to context documents.
///
/// Lookup order is runtime additional contexts, then bundled static contexts,
/// then the fetcher. Loaded documents are cached for the lifetime of the
/// resolver; concurrent first loads of one URL share a single fetch, and
/// failures are not cached.
pub struct ContextResolver {
    static_context_map: &'static ContextMap,
    additional_contexts: HashMap<String, Arc<Value>>,
    fetcher: Option<Arc<dyn ContextFetcher>>,
    fetch_timeout: Duration,
    cache: RwLock<HashMap<String, Arc<tokio::sync::OnceCell<Arc<Value>>>>>,
}

impl ContextResolver {
    /// A resolver that only knows bundled and additional contexts.
    ///
    /// Additional contexts (URL to JSON text) take precedence over static
    /// contexts.
    pub fn offline(additional_contexts: Option<HashMap<String, String>>) -> Result<Self> {
        let static_context_map = static_contexts()?;

        let additional_contexts = additional_contexts
            .unwrap_or_default()
            .into_iter()
            .map(|(url, json)| {
                let document = parse_context_document(&url, &json)?;
                Ok((url, Arc::new(document)))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            static_context_map,
            additional_contexts,
            fetcher: None,
            fetch_timeout: Duration::from_millis(10_000),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Enables fetching of unpinned contexts, each fetch bounded by `timeout`.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContextFetcher>, timeout: Duration) -> Self {
        self.fetcher = Some(fetcher);
        self.fetch_timeout = timeout;
        self
    }

    pub fn allows_remote(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Loads the context document for a single URL.
    pub async fn resolve(&self, url: &str) -> Result<Arc<Value>> {
        if let Some(document) = self.additional_contexts.get(url) {
            return Ok(document.clone());
        }

        if IriBuf::new(url).is_err() {
            return Err(ContextResolutionError::new(
                url,
                "context references must be absolute IRIs",
            ));
        }

        let cached = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(url).cloned());

        let cell = match cached {
            Some(cell) => cell,
            None => {
                let mut cache = self
                    .cache
                    .write()
                    .map_err(|_| ContextResolutionError::new(url, "context cache poisoned"))?;
                cache.entry(url.to_owned()).or_default().clone()
            }
        };

        cell.get_or_try_init(|| self.load(url)).await.cloned()
    }

    async fn load(&self, url: &str) -> Result<Arc<Value>> {
        debug!("Loading context: {url}");

        let context_str = if let Some(ctx) = self.static_context_map.get(url) {
            (*ctx).to_owned()
        } else {
            let Some(fetcher) = &self.fetcher else {
                return Err(ContextResolutionError::new(
                    url,
                    "context is not pinned and remote fetching is disabled",
                ));
            };

            tokio::time::timeout(self.fetch_timeout, fetcher.fetch(url))
                .await
                .map_err(|_| {
                    warn!("Context fetch timed out: {url}");
                    ContextResolutionError::new(
                        url,
                        format!("fetch timed out after {:?}", self.fetch_timeout),
                    )
                })??
        };

        trace!("Context: {context_str}");

        parse_context_document(url, &context_str).map(Arc::new)
    }
}

/// Feeds one document expansion with the documents a [`ContextResolver`]
/// loads.
///
/// The first resolution failure is kept in `failure` so the caller can report
/// it as is, rather than the processor's generic loading error code.
pub struct ContextLoader<'r> {
    resolver: &'r ContextResolver,
    failure: &'r OnceCell<ContextResolutionError>,
    loaded: BTreeSet<String>,
}

impl<'r> ContextLoader<'r> {
    pub fn new(
        resolver: &'r ContextResolver,
        failure: &'r OnceCell<ContextResolutionError>,
    ) -> Self {
        Self {
            resolver,
            failure,
            loaded: BTreeSet::new(),
        }
    }

    async fn load_document(&mut self, url: &str) -> Result<Meta<syntax::Value<Span>, Span>> {
        if self.loaded.insert(url.to_owned()) && self.loaded.len() > MAX_CONTEXTS {
            return Err(ContextResolutionError::new(
                url,
                format!("document references more than {MAX_CONTEXTS} contexts"),
            ));
        }

        let document = self.resolver.resolve(url).await?;

        let json = serde_json::to_string(document.as_ref())
            .map_err(|e| ContextResolutionError::new(url, e.to_string()))?;

        syntax::Value::parse_str(&json, |span| span)
            .map_err(|Meta(e, _)| ContextResolutionError::new(url, format!("invalid JSON: {e}")))
    }
}

impl Loader<IriBuf, Span> for ContextLoader<'_> {
    type Output = syntax::Value<Span>;
    type Error = ContextResolutionError;

    fn load_with<'a>(
        &'a mut self,
        _vocabulary: &'a mut (impl Sync + Send + IriVocabularyMut<Iri = IriBuf>),
        url: IriBuf,
    ) -> BoxFuture<'a, json_ld::LoadingResult<IriBuf, Span, Self::Output, Self::Error>>
    where
        IriBuf: 'a,
    {
        async move {
            match self.load_document(url.as_str()).await {
                Ok(document) => Ok(RemoteDocument::new(Some(url), None, document)),
                Err(e) => {
                    let _ = self.failure.set(e.clone());
                    Err(e)
                }
            }
        }
        .boxed()
    }
}

fn parse_context_document(url: &str, json: &str) -> Result<Value> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| ContextResolutionError::new(url, format!("invalid JSON: {e}")))?;

    match document.get("@context") {
        Some(Value::Object(_) | Value::Array(_) | Value::String(_) | Value::Null) => Ok(document),
        Some(_) => Err(ContextResolutionError::new(
            url,
            "@context must be an object, array, string or null",
        )),
        None => Err(ContextResolutionError::new(
            url,
            "context document has no @context entry",
        )),
    }
}

/// Get static contexts map.
///
/// These contexts are bundled into the binary so that documents referencing
/// them seal the same way with or without network access.
pub fn static_contexts() -> Result<&'static ContextMap> {
    static STATIC_CONTEXTS: OnceCell<ContextMap> = OnceCell::new();

    let static_contexts = STATIC_CONTEXTS.get_or_try_init(build_static_contexts)?;

    Ok(static_contexts)
}

fn build_static_contexts() -> Result<ContextMap> {
    let http_links: ContextMap = [
        ("https://pflow.xyz/schema", {
            let json = include_str!("../../static_contexts/http/pflow.xyz/schema");
            validate_json_string("https://pflow.xyz/schema", json)?;
            json
        }),
    ]
    .into_iter()
    .map(|(link, json)| (link.to_owned(), json))
    .collect();

    Ok(http_links)
}

fn validate_json_string(url: &str, s: &str) -> Result<()> {
    parse_context_document(url, s).map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Duration,
        documents: HashMap<String, String>,
    }

    impl CountingFetcher {
        fn new(documents: &[(&str, &str)]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                documents: documents
                    .iter()
                    .map(|(url, json)| (url.to_string(), json.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ContextFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| ContextResolutionError::new(url, "HTTP status 404 Not Found"))
        }
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn iri(url: &str) -> IriBuf {
        IriBuf::new(url).unwrap()
    }

    #[tokio::test]
    async fn static_contexts_resolve_offline() {
        init_logger();

        let resolver = ContextResolver::offline(None).unwrap();

        let context = resolver.resolve("https://pflow.xyz/schema").await.unwrap();

        assert!(context["@context"].is_object());
        assert_eq!(
            context["@context"]["@vocab"],
            json!("https://pflow.xyz/schema#")
        );
    }

    #[tokio::test]
    async fn additional_contexts_take_precedence() {
        let additional = HashMap::from([(
            "https://pflow.xyz/schema".to_owned(),
            r#"{"@context": {"override": "https://example.com/override"}}"#.to_owned(),
        )]);
        let resolver = ContextResolver::offline(Some(additional)).unwrap();

        let context = resolver.resolve("https://pflow.xyz/schema").await.unwrap();

        assert_eq!(
            context["@context"]["override"],
            json!("https://example.com/override")
        );
    }

    #[tokio::test]
    async fn invalid_additional_context_rejected() {
        let additional = HashMap::from([(
            "https://example.com/broken".to_owned(),
            "{not json".to_owned(),
        )]);

        assert!(ContextResolver::offline(Some(additional)).is_err());
    }

    #[tokio::test]
    async fn unpinned_context_without_fetcher_fails() {
        let resolver = ContextResolver::offline(None).unwrap();

        let err = resolver.resolve("https://example.com/unknown").await.unwrap_err();

        assert_eq!(err.url, "https://example.com/unknown");
        assert!(err.reason.contains("not pinned"), "{err}");
    }

    #[tokio::test]
    async fn relative_context_reference_fails() {
        let resolver = ContextResolver::offline(None).unwrap();

        let err = resolver.resolve("context.jsonld").await.unwrap_err();

        assert!(err.reason.contains("absolute"), "{err}");
    }

    #[tokio::test]
    async fn concurrent_first_loads_share_one_fetch() {
        init_logger();

        let fetcher = Arc::new(CountingFetcher::new(&[(
            "https://example.com/ctx",
            r#"{"@context": {"name": "http://schema.org/name"}}"#,
        )]));
        let resolver = Arc::new(
            ContextResolver::offline(None)
                .unwrap()
                .with_fetcher(fetcher.clone(), Duration::from_secs(5)),
        );

        let tasks = (0..8).map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("https://example.com/ctx").await })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // warm cache, no further fetches
        resolver.resolve("https://example.com/ctx").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let fetcher = Arc::new(CountingFetcher::new(&[]));
        let resolver = ContextResolver::offline(None)
            .unwrap()
            .with_fetcher(fetcher.clone(), Duration::from_secs(5));

        assert!(resolver.resolve("https://example.com/missing").await.is_err());
        assert!(resolver.resolve("https://example.com/missing").await.is_err());

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_timeout() {
        let mut fetcher = CountingFetcher::new(&[(
            "https://example.com/slow",
            r#"{"@context": {}}"#,
        )]);
        fetcher.delay = Duration::from_millis(500);

        let resolver = ContextResolver::offline(None)
            .unwrap()
            .with_fetcher(Arc::new(fetcher), Duration::from_millis(10));

        let err = resolver.resolve("https://example.com/slow").await.unwrap_err();

        assert!(err.reason.contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn loader_serves_resolved_documents() {
        init_logger();

        let resolver = ContextResolver::offline(None).unwrap();
        let failure = OnceCell::new();
        let mut loader = ContextLoader::new(&resolver, &failure);

        let document = loader.load(iri("https://pflow.xyz/schema")).await.unwrap();

        assert_eq!(
            document.url().map(|url| url.as_str()),
            Some("https://pflow.xyz/schema")
        );
        assert!(document.document().as_object().is_some());
        assert!(failure.get().is_none());
    }

    #[tokio::test]
    async fn loader_records_first_failure() {
        let resolver = ContextResolver::offline(None).unwrap();
        let failure = OnceCell::new();
        let mut loader = ContextLoader::new(&resolver, &failure);

        assert!(loader.load(iri("https://example.com/first")).await.is_err());
        assert!(loader.load(iri("https://example.com/second")).await.is_err());

        assert_eq!(failure.get().unwrap().url, "https://example.com/first");
    }

    #[tokio::test]
    async fn loader_bounds_distinct_contexts() {
        let urls: Vec<String> = (0..=MAX_CONTEXTS)
            .map(|i| format!("https://example.com/ctx/{i}"))
            .collect();
        let documents: Vec<(&str, &str)> = urls
            .iter()
            .map(|url| (url.as_str(), r#"{"@context": {}}"#))
            .collect();
        let fetcher = Arc::new(CountingFetcher::new(&documents));
        let resolver = ContextResolver::offline(None)
            .unwrap()
            .with_fetcher(fetcher, Duration::from_secs(5));
        let failure = OnceCell::new();
        let mut loader = ContextLoader::new(&resolver, &failure);

        for url in &urls[..MAX_CONTEXTS] {
            loader.load(iri(url)).await.unwrap();
        }
        // reloading a known context does not count again
        loader.load(iri(&urls[0])).await.unwrap();

        let err = loader.load(iri(&urls[MAX_CONTEXTS])).await.err().unwrap();

        assert!(err.reason.contains("more than"), "{err}");
    }
}
