//! View query executor.
//!
//! A view is a named set of queries. Loading a view runs every query's fetch
//! function, loads the returned documents through the mutation serializer
//! and records, per query, the identifiers of the primary data. Entities
//! themselves live in the store; views only reference them.

use futures::future::BoxFuture;
use jam_core::{Document, PrimaryIdentifiers};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{EngineError, EngineResult};
use crate::events::{StoreEvent, WriteIntent};
use crate::serializer::SerializerHandle;
use crate::store::AppStore;

/// Parameters passed to every fetch function of a view.
pub type Props = Value;

/// Per-query result of a view.
pub type ViewResult = PrimaryIdentifiers;

/// Per-query metadata: the document's `meta` plus its `links`.
pub type Meta = Map<String, Value>;

/// Error returned by a fetch function.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a fetch function. `None` stands for an empty response.
pub type FetchResult = Result<Option<Document>, FetchError>;

/// A caller-supplied fetch function.
pub type QueryFn = Arc<dyn Fn(Props) -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Wraps an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(Props) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    Arc::new(move |props| Box::pin(f(props)))
}

/// Load status of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewStatus {
    /// A load is in progress.
    Requested,
    /// The last load succeeded.
    Loaded,
    /// The last load failed; results are from the last success.
    Failed {
        /// Error message.
        errors: String,
    },
}

/// Cached results of a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    /// View name.
    pub name: String,
    /// Load status.
    pub status: ViewStatus,
    /// Identifiers per query.
    pub results: BTreeMap<String, ViewResult>,
    /// Metadata per collection query.
    pub meta: BTreeMap<String, Meta>,
}

impl View {
    /// Creates an empty view.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ViewStatus::Requested,
            results: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Returns the result of one query.
    pub fn result(&self, query: &str) -> Option<&ViewResult> {
        self.results.get(query)
    }
}

/// A request to load a view.
#[derive(Clone)]
pub struct ViewRequest {
    /// View name.
    pub name: String,
    /// Queries in execution order.
    pub queries: Vec<(String, QueryFn)>,
    /// Parameters passed to every fetch function.
    pub props: Props,
}

impl ViewRequest {
    /// Creates a request with no queries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queries: Vec::new(),
            props: Value::Null,
        }
    }

    /// Adds a query.
    pub fn query(mut self, name: impl Into<String>, fetch: QueryFn) -> Self {
        self.queries.push((name.into(), fetch));
        self
    }

    /// Sets the props.
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }
}

impl fmt::Debug for ViewRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRequest")
            .field("name", &self.name)
            .field(
                "queries",
                &self.queries.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("props", &self.props)
            .finish()
    }
}

/// Outcome of a view load.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    /// Results were published.
    Loaded(View),
    /// The load failed; prior results were kept.
    Failed(String),
    /// A newer load of the same view started first; nothing was published.
    Superseded,
}

impl ViewOutcome {
    /// Returns true if results were published.
    pub fn is_loaded(&self) -> bool {
        matches!(self, ViewOutcome::Loaded(_))
    }
}

type QueryResults = (BTreeMap<String, ViewResult>, BTreeMap<String, Meta>);

/// Runs view loads against a store.
#[derive(Clone, Debug)]
pub struct ViewLoader {
    store: AppStore,
    serializer: SerializerHandle,
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl ViewLoader {
    /// Creates a loader.
    pub fn new(store: AppStore, serializer: SerializerHandle) -> Self {
        Self {
            store,
            serializer,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Loads a view.
    ///
    /// Publishes `LoadViewRequest`, runs the queries in order, loads every
    /// returned document as one batch and waits for the store to apply it
    /// before publishing `LoadViewSuccess`. Any error publishes
    /// `LoadViewFailure` and leaves the view's previous results in place.
    pub async fn load_view(&self, request: ViewRequest) -> ViewOutcome {
        let generation = self.begin(&request.name);
        info!(view = %request.name, queries = request.queries.len(), "loading view");
        self.store.emit(StoreEvent::LoadViewRequest {
            name: request.name.clone(),
        });

        let outcome = self.execute(&request).await;
        if !self.is_current(&request.name, generation) {
            debug!(view = %request.name, "view load superseded");
            return ViewOutcome::Superseded;
        }

        match outcome {
            Ok((results, meta)) => {
                self.store.emit(StoreEvent::LoadViewSuccess {
                    name: request.name.clone(),
                    results: results.clone(),
                    meta: meta.clone(),
                });
                debug!(view = %request.name, "view loaded");
                ViewOutcome::Loaded(View {
                    name: request.name,
                    status: ViewStatus::Loaded,
                    results,
                    meta,
                })
            }
            Err(e) => {
                error!(view = %request.name, error = %e, "view load failed");
                let errors = e.to_string();
                self.store.emit(StoreEvent::LoadViewFailure {
                    name: request.name,
                    errors: errors.clone(),
                });
                ViewOutcome::Failed(errors)
            }
        }
    }

    /// Drops a view's cached results.
    ///
    /// A load of that view still in flight will not be published.
    pub fn clear_view(&self, name: &str) -> Option<View> {
        self.begin(name);
        self.store.remove_view(name)
    }

    async fn execute(&self, request: &ViewRequest) -> EngineResult<QueryResults> {
        let mut results = BTreeMap::new();
        let mut meta = BTreeMap::new();
        let mut documents = Vec::new();

        for (name, fetch) in &request.queries {
            debug!(view = %request.name, query = %name, "fetching");
            let document = fetch(request.props.clone())
                .await
                .map_err(|e| EngineError::fetch(name.as_str(), e))?;

            let Some(document) = document else {
                results.insert(name.clone(), PrimaryIdentifiers::None);
                continue;
            };
            results.insert(name.clone(), document.identifiers()?);
            if document.is_collection() {
                meta.insert(name.clone(), collection_meta(&document));
            }
            documents.push(document);
        }

        self.serializer
            .submit(WriteIntent::LoadJson { documents })
            .await?;
        Ok((results, meta))
    }

    fn begin(&self, name: &str) -> u64 {
        let mut generations = self.generations.lock();
        let generation = generations.entry(name.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current(&self, name: &str, generation: u64) -> bool {
        self.generations.lock().get(name) == Some(&generation)
    }
}

fn collection_meta(document: &Document) -> Meta {
    let mut meta = document.meta.clone().unwrap_or_default();
    if let Some(links) = &document.links {
        meta.insert("links".to_string(), Value::Object(links.clone()));
    }
    meta
}
