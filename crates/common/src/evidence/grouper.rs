//! Document grouper
//!
//! Partitions an evidence set by source document and gathers the facets of
//! each chunk into a single cluster.

use super::accumulator::EvidenceSet;
use super::record::ChunkSource;
use serde::Serialize;

/// Default limit for facet content shown in the digest
pub const DEFAULT_SNIPPET_CHARS: usize = 300;

/// Marker appended to truncated facet content
pub const ELLIPSIS: &str = "...";

/// A chunk's content as returned by one retrieval operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub source: ChunkSource,
    pub content: String,
    pub position: Option<u32>,
}

/// All facets of one chunk within one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkCluster {
    pub chunk_id: String,
    /// Facets in storage order, at most one per source
    pub facets: Vec<Facet>,
    /// Representative position, filled in by the sequencer
    pub position: Option<u32>,
}

impl ChunkCluster {
    fn new(chunk_id: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            facets: Vec::with_capacity(2),
            position: None,
        }
    }

    /// Content of the facet produced by `source`, if present
    pub fn content(&self, source: ChunkSource) -> Option<&str> {
        self.facets
            .iter()
            .find(|f| f.source == source)
            .map(|f| f.content.as_str())
    }
}

/// Clusters belonging to one source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentGroup {
    /// document_id when known, display name otherwise
    pub group_key: String,
    pub display_name: String,
    pub clusters: Vec<ChunkCluster>,
    /// Set by the sequencer when resolved positions skip indices
    pub has_gaps: bool,
}

/// Truncate to `limit` characters, appending an ellipsis when anything was cut
pub fn truncate_snippet(content: &str, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &content[..cut], ELLIPSIS),
        None => content.to_string(),
    }
}

/// Group records by document, then by chunk id, keeping first-seen order
pub fn group_by_document(set: &EvidenceSet, snippet_chars: usize) -> Vec<DocumentGroup> {
    let mut groups: Vec<DocumentGroup> = Vec::new();

    for record in set.records() {
        let key = record.group_key();
        let group_idx = match groups.iter().position(|g| g.group_key == key) {
            Some(idx) => idx,
            None => {
                groups.push(DocumentGroup {
                    group_key: key.to_string(),
                    display_name: record.document_name.clone(),
                    clusters: Vec::new(),
                    has_gaps: false,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[group_idx];

        let cluster_idx = match group
            .clusters
            .iter()
            .position(|c| c.chunk_id == record.chunk_id)
        {
            Some(idx) => idx,
            None => {
                group.clusters.push(ChunkCluster::new(&record.chunk_id));
                group.clusters.len() - 1
            }
        };
        let cluster = &mut group.clusters[cluster_idx];

        // Evidence sets are unique per (chunk, source); keep the first facet regardless
        if cluster.content(record.source).is_none() {
            cluster.facets.push(Facet {
                source: record.source,
                content: truncate_snippet(&record.content, snippet_chars),
                position: record.position,
            });
        }
    }

    groups
}
