//! Retrieval gateway
//!
//! The agent reaches the knowledge base through three operations:
//! - `explore`: list the documents of the datasets in scope
//! - `search`: find chunks relevant to a query
//! - `probe`: read the chunks around a known chunk
//!
//! Backends implement a smaller set of native calls (`RetrievalBackend`);
//! `RetrievalGateway` composes them into the three operations. The scope is
//! passed on every call and never cached.

pub mod format;
pub mod memory;
pub mod ragflow;
pub mod tools;

pub use memory::InMemoryBackend;
pub use ragflow::RagflowBackend;
pub use tools::{tool_definitions, ToolInvocation, ToolRunner};

use crate::config::RetrievalConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Datasets (and optionally documents) a call may read from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub dataset_ids: Vec<String>,
    /// Restricts reads to these documents when present
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
}

impl Scope {
    pub fn new(dataset_ids: Vec<String>) -> Self {
        Self {
            dataset_ids,
            document_ids: None,
        }
    }

    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }

    /// No dataset to read from
    pub fn is_empty(&self) -> bool {
        self.dataset_ids.is_empty()
    }

    pub fn allows_document(&self, document_id: &str) -> bool {
        match &self.document_ids {
            Some(ids) => ids.iter().any(|id| id == document_id),
            None => true,
        }
    }
}

/// Side of the target chunk a probe reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Before,
    After,
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Before => "before",
            Direction::After => "after",
            Direction::Both => "both",
        }
    }

    /// Slice the window around `target` out of a position-ordered sequence
    pub fn window<'a, T>(&self, items: &'a [T], target: usize, count: usize) -> Vec<&'a T> {
        let before = || &items[target.saturating_sub(count)..target];
        let after = || {
            let end = target.saturating_add(1).saturating_add(count).min(items.len());
            &items[(target + 1).min(items.len())..end]
        };

        match self {
            Direction::Before => before().iter().collect(),
            Direction::After => after().iter().collect(),
            Direction::Both => before().iter().chain(after()).collect(),
        }
    }
}

impl FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "before" => Ok(Direction::Before),
            "after" => Ok(Direction::After),
            "both" => Ok(Direction::Both),
            other => Err(AppError::Validation {
                message: format!("Invalid direction '{other}'. Use 'before', 'after', or 'both'."),
                field: Some("direction".to_string()),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub chunk_count: u64,
}

/// A chunk as returned by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub id: String,
    pub document_id: Option<String>,
    pub document_name: String,
    pub content: String,
    pub position: Option<u32>,
}

/// Native retrieval query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalQuery {
    pub question: String,
    pub dataset_ids: Vec<String>,
    pub document_ids: Option<Vec<String>>,
    pub page_size: usize,
    pub similarity_threshold: f32,
    pub toc_enhance: bool,
}

/// Native operations of a retrieval service
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Look up one dataset, `None` when it does not exist
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>>;

    /// List the documents of a dataset
    async fn list_documents(&self, dataset_id: &str, page_size: usize) -> Result<Vec<DocumentInfo>>;

    /// Ranked chunk retrieval
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<ChunkInfo>>;

    /// List the chunks of a document in storage order
    async fn list_chunks(
        &self,
        dataset_id: &str,
        document_id: &str,
        page_size: usize,
    ) -> Result<Vec<ChunkInfo>>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<()>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Pick the backend named by the configuration
///
/// Returns `Ok(None)` when the provider needs credentials that are missing;
/// the gateway then answers every call with the not-configured sentinel.
pub fn create_backend(config: &RetrievalConfig) -> Result<Option<Arc<dyn RetrievalBackend>>> {
    match config.provider.as_str() {
        "ragflow" => match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(Some(Arc::new(RagflowBackend::new(config)?))),
            _ => {
                tracing::warn!("Retrieval API key missing, tools will report not configured");
                Ok(None)
            }
        },
        "memory" => Ok(Some(Arc::new(InMemoryBackend::new()))),
        other => Err(AppError::Configuration {
            message: format!("Unknown retrieval provider: {other}"),
        }),
    }
}

/// Documents of one dataset, as listed by `explore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetListing {
    pub dataset: DatasetInfo,
    pub documents: Vec<DocumentInfo>,
}

/// Chunks around a probed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeWindow {
    pub document_name: String,
    pub chunks: Vec<ChunkInfo>,
}

/// Page sizes and retrieval knobs used by the gateway
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub page_size: usize,
    pub probe_page_size: usize,
    pub document_page_size: usize,
    pub similarity_threshold: f32,
    pub toc_enhance: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for GatewayOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            page_size: config.page_size,
            probe_page_size: config.probe_page_size,
            document_page_size: config.document_page_size,
            similarity_threshold: config.similarity_threshold,
            toc_enhance: config.toc_enhance,
        }
    }
}

/// Explore, search and probe on top of a backend
#[derive(Clone)]
pub struct RetrievalGateway {
    backend: Option<Arc<dyn RetrievalBackend>>,
    options: GatewayOptions,
}

impl RetrievalGateway {
    pub fn new(backend: Option<Arc<dyn RetrievalBackend>>, options: GatewayOptions) -> Self {
        Self { backend, options }
    }

    /// Build the gateway from configuration
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self::new(create_backend(config)?, GatewayOptions::from(config)))
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    fn backend(&self) -> Result<&Arc<dyn RetrievalBackend>> {
        self.backend.as_ref().ok_or(AppError::BackendNotConfigured)
    }

    /// Backend configured and reachable
    pub async fn ping(&self) -> Result<()> {
        self.backend()?.ping().await
    }

    /// Documents of every in-scope dataset that exists
    #[instrument(skip(self, scope), fields(datasets = scope.dataset_ids.len()))]
    pub async fn explore(&self, scope: &Scope) -> Result<Vec<DatasetListing>> {
        let backend = self.backend()?;
        let mut listings = Vec::with_capacity(scope.dataset_ids.len());

        for dataset_id in &scope.dataset_ids {
            let Some(dataset) = backend.get_dataset(dataset_id).await? else {
                debug!(dataset_id = %dataset_id, "Dataset not found, skipping");
                continue;
            };

            let documents = backend
                .list_documents(dataset_id, self.options.document_page_size)
                .await?
                .into_iter()
                .filter(|d| scope.allows_document(&d.id))
                .collect();

            listings.push(DatasetListing { dataset, documents });
        }

        Ok(listings)
    }

    /// Ranked chunks for `query`, at most `page_size` of them
    #[instrument(skip(self, scope), fields(datasets = scope.dataset_ids.len()))]
    pub async fn search(&self, query: &str, scope: &Scope) -> Result<Vec<ChunkInfo>> {
        let backend = self.backend()?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let request = RetrievalQuery {
            question: query.to_string(),
            dataset_ids: scope.dataset_ids.clone(),
            document_ids: scope.document_ids.clone(),
            page_size: self.options.page_size,
            similarity_threshold: self.options.similarity_threshold,
            toc_enhance: self.options.toc_enhance,
        };

        let mut chunks = backend.retrieve(&request).await?;
        chunks.retain(|c| c.document_id.as_deref().map_or(true, |id| scope.allows_document(id)));
        chunks.truncate(self.options.page_size);

        debug!(results = chunks.len(), "Search complete");
        Ok(chunks)
    }

    /// Chunks before and/or after `chunk_id` in its document
    ///
    /// The first in-scope document containing the chunk wins. Its chunks are
    /// ordered by position (a missing position sorts as 0, ties keep storage
    /// order) and the target itself is excluded. `None` when no document in
    /// scope holds the chunk.
    #[instrument(skip(self, scope), fields(datasets = scope.dataset_ids.len()))]
    pub async fn probe(
        &self,
        chunk_id: &str,
        direction: Direction,
        count: usize,
        scope: &Scope,
    ) -> Result<Option<ProbeWindow>> {
        let backend = self.backend()?;

        for dataset_id in &scope.dataset_ids {
            if backend.get_dataset(dataset_id).await?.is_none() {
                continue;
            }

            let documents = backend
                .list_documents(dataset_id, self.options.document_page_size)
                .await?;

            for document in documents.iter().filter(|d| scope.allows_document(&d.id)) {
                let mut chunks = backend
                    .list_chunks(dataset_id, &document.id, self.options.probe_page_size)
                    .await?;

                if !chunks.iter().any(|c| c.id == chunk_id) {
                    continue;
                }

                chunks.sort_by_key(|c| c.position.unwrap_or(0));
                let Some(target) = chunks.iter().position(|c| c.id == chunk_id) else {
                    continue;
                };

                let window = direction
                    .window(&chunks, target, count)
                    .into_iter()
                    .cloned()
                    .collect();

                return Ok(Some(ProbeWindow {
                    document_name: document.name.clone(),
                    chunks: window,
                }));
            }
        }

        Ok(None)
    }
}

impl fmt::Debug for RetrievalGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalGateway")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> InMemoryBackend {
        InMemoryBackend::new()
            .with_dataset("ds1", "Manuals")
            .with_document(
                "ds1",
                "d1",
                "Operations Manual",
                vec![
                    ("c3", "Restart the node.", Some(3)),
                    ("c1", "Install the agent.", Some(1)),
                    ("c2", "Configure networking.", Some(2)),
                    ("c4", "Check throughput metrics.", Some(4)),
                    ("c5", "Tune the cache.", Some(5)),
                ],
            )
            .with_document("ds1", "d2", "Release Notes", vec![("r1", "Throughput improved.", Some(1))])
    }

    fn gateway() -> RetrievalGateway {
        RetrievalGateway::new(Some(Arc::new(corpus())), GatewayOptions::default())
    }

    fn scope() -> Scope {
        Scope::new(vec!["ds1".into()])
    }

    fn ids(window: &ProbeWindow) -> Vec<&str> {
        window.chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("before".parse::<Direction>().unwrap(), Direction::Before);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::default(), Direction::Both);
    }

    #[test]
    fn test_window_edges() {
        let items = [0, 1, 2, 3, 4];
        let vals = |v: Vec<&i32>| v.into_iter().copied().collect::<Vec<_>>();
        assert_eq!(vals(Direction::Before.window(&items[..], 1, 2)), vec![0]);
        assert_eq!(vals(Direction::After.window(&items[..], 3, 2)), vec![4]);
        assert_eq!(vals(Direction::Both.window(&items[..], 2, 1)), vec![1, 3]);
        assert!(Direction::After.window(&items[..], 4, 2).is_empty());
    }

    #[test]
    fn test_scope_document_filter() {
        let scope = scope().with_documents(vec!["d1".into()]);
        assert!(scope.allows_document("d1"));
        assert!(!scope.allows_document("d2"));
        assert!(Scope::default().is_empty());
    }

    #[tokio::test]
    async fn test_probe_windows() {
        let gw = gateway();

        let both = gw.probe("c3", Direction::Both, 2, &scope()).await.unwrap().unwrap();
        assert_eq!(both.document_name, "Operations Manual");
        assert_eq!(ids(&both), vec!["c1", "c2", "c4", "c5"]);

        let before = gw.probe("c3", Direction::Before, 1, &scope()).await.unwrap().unwrap();
        assert_eq!(ids(&before), vec!["c2"]);

        let after = gw.probe("c3", Direction::After, 5, &scope()).await.unwrap().unwrap();
        assert_eq!(ids(&after), vec!["c4", "c5"]);
    }

    #[tokio::test]
    async fn test_probe_unknown_chunk_or_out_of_scope() {
        let gw = gateway();
        assert!(gw.probe("nope", Direction::Both, 2, &scope()).await.unwrap().is_none());

        let narrowed = scope().with_documents(vec!["d2".into()]);
        assert!(gw.probe("c3", Direction::Both, 2, &narrowed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_respects_scope_and_page_size() {
        let gw = RetrievalGateway::new(
            Some(Arc::new(corpus())),
            GatewayOptions {
                page_size: 1,
                ..GatewayOptions::default()
            },
        );

        let hits = gw.search("throughput", &scope()).await.unwrap();
        assert_eq!(hits.len(), 1);

        let narrowed = scope().with_documents(vec!["d2".into()]);
        let hits = gateway().search("throughput", &narrowed).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "r1");

        assert!(gateway().search("throughput", &Scope::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explore_skips_missing_datasets() {
        let scope = Scope::new(vec!["missing".into(), "ds1".into()]);
        let listings = gateway().explore(&scope).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].dataset.name, "Manuals");
        assert_eq!(listings[0].documents.len(), 2);
        assert_eq!(listings[0].documents[0].chunk_count, 5);
    }

    #[tokio::test]
    async fn test_unconfigured_gateway() {
        let gw = RetrievalGateway::new(None, GatewayOptions::default());
        assert!(!gw.is_configured());
        assert!(matches!(gw.search("q", &scope()).await, Err(AppError::BackendNotConfigured)));
        assert!(matches!(gw.ping().await, Err(AppError::BackendNotConfigured)));
    }

    #[test]
    fn test_create_backend_without_key() {
        let config = RetrievalConfig::default();
        assert!(create_backend(&config).unwrap().is_none());

        let memory = RetrievalConfig {
            provider: "memory".into(),
            ..RetrievalConfig::default()
        };
        assert_eq!(create_backend(&memory).unwrap().unwrap().name(), "memory");

        let bogus = RetrievalConfig {
            provider: "bogus".into(),
            ..RetrievalConfig::default()
        };
        assert!(create_backend(&bogus).is_err());
    }
}
