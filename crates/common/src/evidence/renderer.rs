//! Context renderer
//!
//! Serializes grouped, ordered evidence into the digest shown to the model.
//! Output depends only on its input, so equal transcripts give byte-identical
//! digests.

use super::grouper::DocumentGroup;
use super::record::ChunkSource;
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::fmt::Write;

pub const GAP_NOTE: &str = "  (Note: chunks are non-consecutive - may have gaps)";
pub const MULTI_DOCUMENT_NOTE: &str =
    "Note: Chunks are from multiple documents - verify context consistency.";
pub const CITATION_INSTRUCTION: &str =
    "Use [ref:CHUNK_ID] to cite. Only cite chunks that are relevant to the question.";

/// Facet order on cluster sub-lines
const FACET_ORDER: [ChunkSource; 2] = [ChunkSource::Search, ChunkSource::Probe];

/// Rendered evidence digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub text: String,
    pub items: usize,
    pub unique_chunks: usize,
    pub documents: usize,
    /// Hex SHA-256 of `text`
    pub fingerprint: String,
}

impl Digest {
    pub fn new(text: String, items: usize, unique_chunks: usize, documents: usize) -> Self {
        let fingerprint = hex::encode(Sha256::digest(text.as_bytes()));
        Self {
            text,
            items,
            unique_chunks,
            documents,
            fingerprint,
        }
    }
}

/// Header line of the digest
pub fn header_line(items: usize, unique_chunks: usize) -> String {
    format!("== Gathered Evidence ({items} items, {unique_chunks} unique chunks) ==")
}

/// Render one document block (no trailing newline)
pub fn render_group(group: &DocumentGroup) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write!(out, "[{}]", group.display_name);

    if group.has_gaps {
        out.push('\n');
        out.push_str(GAP_NOTE);
    }

    for cluster in &group.clusters {
        match cluster.position {
            Some(pos) => {
                let _ = write!(out, "\n  #{} @{}:", cluster.chunk_id, pos);
            }
            None => {
                let _ = write!(out, "\n  #{}:", cluster.chunk_id);
            }
        }

        for source in FACET_ORDER {
            match cluster.content(source) {
                Some(content) if !content.is_empty() => {
                    let _ = write!(out, "\n    [{}] {}", source.label(), content);
                }
                _ => {}
            }
        }
    }

    out
}

/// Render sequenced groups into the full digest text
pub fn render_digest(groups: &[DocumentGroup], items: usize, unique_chunks: usize) -> String {
    let mut sections = Vec::with_capacity(groups.len() + 3);
    sections.push(header_line(items, unique_chunks));
    sections.extend(groups.iter().map(render_group));

    if groups.len() > 1 {
        sections.push(MULTI_DOCUMENT_NOTE.to_string());
    }
    sections.push(CITATION_INSTRUCTION.to_string());

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::grouper::{ChunkCluster, Facet};

    fn facet(source: ChunkSource, content: &str) -> Facet {
        Facet {
            source,
            content: content.to_string(),
            position: None,
        }
    }

    #[test]
    fn test_single_group_layout() {
        let group = DocumentGroup {
            group_key: "d1".into(),
            display_name: "Guide".into(),
            clusters: vec![
                ChunkCluster {
                    chunk_id: "a".into(),
                    // Probe stored first still renders after search
                    facets: vec![facet(ChunkSource::Probe, "p"), facet(ChunkSource::Search, "s")],
                    position: Some(3),
                },
                ChunkCluster {
                    chunk_id: "b".into(),
                    facets: vec![facet(ChunkSource::Search, "only")],
                    position: None,
                },
            ],
            has_gaps: false,
        };

        let text = render_digest(&[group], 3, 2);
        let expected = "== Gathered Evidence (3 items, 2 unique chunks) ==\n\
\n\
[Guide]\n  #a @3:\n    [searched] s\n    [probed] p\n  #b:\n    [searched] only\n\
\n\
Use [ref:CHUNK_ID] to cite. Only cite chunks that are relevant to the question.";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_empty_facet_has_no_sub_line() {
        let group = DocumentGroup {
            group_key: "d".into(),
            display_name: "D".into(),
            clusters: vec![ChunkCluster {
                chunk_id: "x".into(),
                facets: vec![facet(ChunkSource::Search, "")],
                position: Some(1),
            }],
            has_gaps: false,
        };
        assert_eq!(render_group(&group), "[D]\n  #x @1:");
    }

    #[test]
    fn test_multi_document_note_and_gap_note() {
        let mk = |key: &str, gaps: bool| DocumentGroup {
            group_key: key.into(),
            display_name: key.to_uppercase(),
            clusters: Vec::new(),
            has_gaps: gaps,
        };
        let text = render_digest(&[mk("a", true), mk("b", false)], 0, 0);
        assert!(text.contains(&format!("[A]\n{GAP_NOTE}")));
        assert!(text.contains(&format!("[B]\n\n{MULTI_DOCUMENT_NOTE}\n\n{CITATION_INSTRUCTION}")));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Digest::new("same".into(), 1, 1, 1);
        let b = Digest::new("same".into(), 1, 1, 1);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
        assert_ne!(a.fingerprint, Digest::new("other".into(), 1, 1, 1).fingerprint);
    }
}
