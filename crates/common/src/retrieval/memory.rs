//! In-process retrieval backend
//!
//! A small deterministic corpus used by tests and by the `memory` provider.
//! Retrieval ranks chunks by how many distinct query terms they contain.

use super::{ChunkInfo, DatasetInfo, DocumentInfo, RetrievalBackend, RetrievalQuery};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct MemoryDocument {
    id: String,
    name: String,
    chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Clone)]
struct MemoryDataset {
    info: DatasetInfo,
    documents: Vec<MemoryDocument>,
}

/// In-memory corpus keyed by dataset
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    datasets: Vec<MemoryDataset>,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty dataset
    pub fn with_dataset(mut self, id: &str, name: &str) -> Self {
        self.datasets.push(MemoryDataset {
            info: DatasetInfo {
                id: id.to_string(),
                name: name.to_string(),
            },
            documents: Vec::new(),
        });
        self
    }

    /// Add a document with `(chunk_id, content, position)` chunks in storage order
    ///
    /// Ignored when the dataset has not been added.
    pub fn with_document(
        mut self,
        dataset_id: &str,
        document_id: &str,
        name: &str,
        chunks: Vec<(&str, &str, Option<u32>)>,
    ) -> Self {
        if let Some(dataset) = self.datasets.iter_mut().find(|d| d.info.id == dataset_id) {
            let chunks = chunks
                .into_iter()
                .map(|(id, content, position)| ChunkInfo {
                    id: id.to_string(),
                    document_id: Some(document_id.to_string()),
                    document_name: name.to_string(),
                    content: content.to_string(),
                    position,
                })
                .collect();

            dataset.documents.push(MemoryDocument {
                id: document_id.to_string(),
                name: name.to_string(),
                chunks,
            });
        }
        self
    }

    fn dataset(&self, id: &str) -> Option<&MemoryDataset> {
        self.datasets.iter().find(|d| d.info.id == id)
    }
}

#[async_trait]
impl RetrievalBackend for InMemoryBackend {
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>> {
        Ok(self.dataset(dataset_id).map(|d| d.info.clone()))
    }

    async fn list_documents(&self, dataset_id: &str, page_size: usize) -> Result<Vec<DocumentInfo>> {
        let documents = self
            .dataset(dataset_id)
            .map(|d| d.documents.as_slice())
            .unwrap_or_default();

        Ok(documents
            .iter()
            .take(page_size)
            .map(|d| DocumentInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                chunk_count: d.chunks.len() as u64,
            })
            .collect())
    }

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<ChunkInfo>> {
        let wanted = terms(&query.question);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &ChunkInfo)> = query
            .dataset_ids
            .iter()
            .filter_map(|id| self.dataset(id))
            .flat_map(|d| d.documents.iter())
            .filter(|doc| {
                query
                    .document_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&doc.id))
            })
            .flat_map(|doc| doc.chunks.iter())
            .filter_map(|chunk| {
                let score = terms(&chunk.content).intersection(&wanted).count();
                (score > 0).then_some((score, chunk))
            })
            .collect();

        // Stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(query.page_size)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }

    async fn list_chunks(
        &self,
        dataset_id: &str,
        document_id: &str,
        page_size: usize,
    ) -> Result<Vec<ChunkInfo>> {
        let chunks = self
            .dataset(dataset_id)
            .and_then(|d| d.documents.iter().find(|doc| doc.id == document_id))
            .map(|doc| doc.chunks.as_slice())
            .unwrap_or_default();

        Ok(chunks.iter().take(page_size).cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(question: &str) -> RetrievalQuery {
        RetrievalQuery {
            question: question.into(),
            dataset_ids: vec!["ds".into()],
            document_ids: None,
            page_size: 10,
            similarity_threshold: 0.2,
            toc_enhance: false,
        }
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new().with_dataset("ds", "Docs").with_document(
            "ds",
            "d1",
            "Guide",
            vec![
                ("a", "Cache warmup", Some(1)),
                ("b", "Cache eviction policy", Some(2)),
                ("c", "Unrelated", Some(3)),
            ],
        )
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_term_overlap() {
        let hits = backend().retrieve(&query("cache eviction")).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(hits[0].document_name, "Guide");
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_empty() {
        let b = backend();
        assert!(b.get_dataset("nope").await.unwrap().is_none());
        assert!(b.list_documents("nope", 10).await.unwrap().is_empty());
        assert!(b.list_chunks("ds", "nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_chunks_keeps_storage_order() {
        let chunks = backend().list_chunks("ds", "d1", 2).await.unwrap();
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
