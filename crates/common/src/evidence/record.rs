//! Chunk records parsed from retrieval tool output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Retrieval operation that produced a chunk facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
    /// Seed chunks returned by `search`
    Search,
    /// Neighbouring chunks returned by `probe`
    Probe,
}

impl ChunkSource {
    /// Map a tool name to the facet it produces, if it produces evidence at all
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "search" => Some(ChunkSource::Search),
            "probe" => Some(ChunkSource::Probe),
            _ => None,
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ChunkSource::Search => "search",
            ChunkSource::Probe => "probe",
        }
    }

    /// Label used on digest sub-lines
    pub fn label(&self) -> &'static str {
        match self {
            ChunkSource::Search => "searched",
            ChunkSource::Probe => "probed",
        }
    }
}

impl fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// One chunk as seen through one retrieval operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: Option<String>,
    pub document_name: String,
    pub content: String,
    pub source: ChunkSource,
    pub position: Option<u32>,
}

impl ChunkRecord {
    /// Dedup identity: the same chunk through two tools is two records
    pub fn key(&self) -> (&str, ChunkSource) {
        (&self.chunk_id, self.source)
    }

    /// Key of the document this record belongs to
    pub fn group_key(&self) -> &str {
        self.document_id.as_deref().unwrap_or(&self.document_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_mapping_is_closed() {
        assert_eq!(ChunkSource::from_tool_name("search"), Some(ChunkSource::Search));
        assert_eq!(ChunkSource::from_tool_name("probe"), Some(ChunkSource::Probe));
        assert_eq!(ChunkSource::from_tool_name("explore"), None);
        assert_eq!(ChunkSource::from_tool_name("Search"), None);
    }

    #[test]
    fn test_group_key_prefers_document_id() {
        let mut record = ChunkRecord {
            chunk_id: "c1".into(),
            document_id: Some("d-42".into()),
            document_name: "Report.pdf".into(),
            content: String::new(),
            source: ChunkSource::Search,
            position: None,
        };
        assert_eq!(record.group_key(), "d-42");

        record.document_id = None;
        assert_eq!(record.group_key(), "Report.pdf");
    }
}
