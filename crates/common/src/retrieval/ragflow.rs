//! RAGFlow REST backend
//!
//! Talks to the RAGFlow HTTP API with bearer authentication. Transport
//! failures and 5xx answers are retried with exponential backoff.

use super::{ChunkInfo, DatasetInfo, DocumentInfo, RetrievalBackend, RetrievalQuery};
use crate::config::RetrievalConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// RAGFlow API client
pub struct RagflowBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

/// Every RAGFlow answer is wrapped in `{code, message, data}`
#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct RagflowDataset {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RagflowDocument {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    chunk_count: u64,
}

#[derive(Deserialize)]
struct DocumentPage {
    #[serde(default)]
    docs: Vec<RagflowDocument>,
}

#[derive(Deserialize)]
struct RagflowChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    document_id: Option<String>,
    /// Document name on retrieval results
    #[serde(default)]
    document_keyword: Option<String>,
    /// Document name on chunk listings
    #[serde(default)]
    docnm_kwd: Option<String>,
    #[serde(default)]
    positions: Option<Value>,
}

#[derive(Deserialize)]
struct ChunkPage {
    #[serde(default)]
    chunks: Vec<RagflowChunk>,
    #[serde(default)]
    doc: Option<RagflowDocument>,
}

#[derive(Serialize)]
struct RetrievalRequest<'a> {
    question: &'a str,
    dataset_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    document_ids: Option<&'a [String]>,
    page_size: usize,
    similarity_threshold: f32,
    toc_enhance: bool,
}

/// Page number of the first layout box, used as the chunk position
///
/// RAGFlow reports positions as `[[page, x0, x1, y0, y1], ...]`.
pub fn first_page(positions: &Value) -> Option<u32> {
    let page = positions.as_array()?.first()?.as_array()?.first()?;
    page.as_u64()
        .or_else(|| page.as_f64().filter(|p| *p >= 0.0).map(|p| p as u64))
        .and_then(|p| u32::try_from(p).ok())
}

impl RagflowChunk {
    fn into_chunk_info(self, fallback_name: Option<&str>) -> ChunkInfo {
        let position = self.positions.as_ref().and_then(first_page);
        let document_name = self
            .document_keyword
            .or(self.docnm_kwd)
            .or_else(|| fallback_name.map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string());

        ChunkInfo {
            id: self.id,
            document_id: self.document_id,
            document_name,
            content: self.content,
            position,
        }
    }
}

impl RagflowBackend {
    /// Create a client from configuration; the API key must be set
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(AppError::BackendNotConfigured)?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query)
    }

    /// Send one request and unwrap the RAGFlow envelope
    async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ServiceUnavailable {
                message: format!("RAGFlow returned {status}: {body}"),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RetrievalError {
                message: format!("RAGFlow returned {status}: {body}"),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != 0 {
            return Err(AppError::RetrievalError {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("RAGFlow error code {}", envelope.code)),
            });
        }

        envelope.data.ok_or_else(|| AppError::RetrievalError {
            message: "RAGFlow response carried no data".to_string(),
        })
    }

    /// Execute with exponential backoff on transient failures
    async fn send_with_retry<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.timeout),
            ..ExponentialBackoff::default()
        };
        let max_retries = self.max_retries;
        let mut attempt = 0u32;

        retry(policy, || {
            attempt += 1;
            let current = attempt;
            let request = build();

            async move {
                Self::execute::<T>(request).await.map_err(|e| {
                    if e.is_transient() && current <= max_retries {
                        warn!(
                            attempt = current,
                            max_retries = max_retries,
                            error = %e,
                            "RAGFlow request failed, retrying"
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}

#[async_trait]
impl RetrievalBackend for RagflowBackend {
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>> {
        let datasets: Vec<RagflowDataset> = self
            .send_with_retry(|| self.get("/datasets", &[("id", dataset_id.to_string())]))
            .await?;

        Ok(datasets.into_iter().next().map(|d| DatasetInfo {
            id: d.id,
            name: d.name,
        }))
    }

    async fn list_documents(&self, dataset_id: &str, page_size: usize) -> Result<Vec<DocumentInfo>> {
        let path = format!("/datasets/{dataset_id}/documents");
        let page: DocumentPage = self
            .send_with_retry(|| {
                self.get(
                    &path,
                    &[("page", "1".to_string()), ("page_size", page_size.to_string())],
                )
            })
            .await?;

        debug!(dataset_id = %dataset_id, documents = page.docs.len(), "Listed documents");

        Ok(page
            .docs
            .into_iter()
            .map(|d| DocumentInfo {
                id: d.id,
                name: d.name,
                chunk_count: d.chunk_count,
            })
            .collect())
    }

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<ChunkInfo>> {
        let body = RetrievalRequest {
            question: &query.question,
            dataset_ids: &query.dataset_ids,
            document_ids: query.document_ids.as_deref(),
            page_size: query.page_size,
            similarity_threshold: query.similarity_threshold,
            toc_enhance: query.toc_enhance,
        };

        let page: ChunkPage = self
            .send_with_retry(|| {
                self.client
                    .post(self.url("/retrieval"))
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await?;

        Ok(page
            .chunks
            .into_iter()
            .map(|c| c.into_chunk_info(None))
            .collect())
    }

    async fn list_chunks(
        &self,
        dataset_id: &str,
        document_id: &str,
        page_size: usize,
    ) -> Result<Vec<ChunkInfo>> {
        let path = format!("/datasets/{dataset_id}/documents/{document_id}/chunks");
        let page: ChunkPage = self
            .send_with_retry(|| {
                self.get(
                    &path,
                    &[("page", "1".to_string()), ("page_size", page_size.to_string())],
                )
            })
            .await?;

        let doc_name = page.doc.map(|d| d.name);
        Ok(page
            .chunks
            .into_iter()
            .map(|c| {
                let mut chunk = c.into_chunk_info(doc_name.as_deref());
                chunk.document_id.get_or_insert_with(|| document_id.to_string());
                chunk
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let _: Value = self
            .send_with_retry(|| {
                self.get(
                    "/datasets",
                    &[("page", "1".to_string()), ("page_size", "1".to_string())],
                )
            })
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "ragflow"
    }
}
