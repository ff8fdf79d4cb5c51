//! Evidence pipeline
//!
//! Turns the tool results of a transcript into the digest the model reads
//! before each reasoning step:
//! - Chunk record parsing
//! - Accumulation and deduplication
//! - Grouping by document
//! - Position sequencing and gap detection
//! - Rendering and injection

mod accumulator;
mod grouper;
mod injector;
mod overview;
mod parser;
mod record;
mod renderer;
mod sequencer;

pub use accumulator::{accumulate, is_failure_content, AccumulationStats, Accumulator, EvidenceSet};
pub use grouper::{
    group_by_document, truncate_snippet, ChunkCluster, DocumentGroup, Facet, DEFAULT_SNIPPET_CHARS,
};
pub use injector::{inject_digest, insertion_index};
pub use overview::{format_sources_overview, inject_sources_overview, SourceOverview, TocHeading};
pub use parser::{parse_chunks, parse_entry, ENTRY_SEPARATOR};
pub use record::{ChunkRecord, ChunkSource};
pub use renderer::{render_digest, Digest, CITATION_INSTRUCTION, GAP_NOTE, MULTI_DOCUMENT_NOTE};
pub use sequencer::{has_gaps, resolve_position, sequence_groups};

use crate::config::EvidenceConfig;
use crate::metrics;
use crate::transcript::Message;

/// Digest builder configuration
#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// Facet content limit in characters
    pub max_snippet_chars: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            max_snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

impl From<&EvidenceConfig> for DigestOptions {
    fn from(config: &EvidenceConfig) -> Self {
        Self {
            max_snippet_chars: config.max_snippet_chars,
        }
    }
}

/// Result of preparing a transcript for the next model call
#[derive(Debug, Clone)]
pub struct PreparedContext {
    /// Transcript with the digest inserted (unchanged when there is no evidence)
    pub messages: Vec<Message>,
    pub digest: Option<Digest>,
    pub stats: AccumulationStats,
}

/// Rebuilds the evidence digest from a transcript
#[derive(Debug, Clone, Default)]
pub struct DigestBuilder {
    options: DigestOptions,
}

impl DigestBuilder {
    /// Create a new digest builder
    pub fn new(options: DigestOptions) -> Self {
        Self { options }
    }

    /// Group and sequence an evidence set
    pub fn organize(&self, set: &EvidenceSet) -> Vec<DocumentGroup> {
        let mut groups = group_by_document(set, self.options.max_snippet_chars);
        sequence_groups(&mut groups);
        groups
    }

    /// Render an evidence set, `None` when it is empty
    pub fn render(&self, set: &EvidenceSet) -> Option<Digest> {
        if set.is_empty() {
            return None;
        }

        let groups = self.organize(set);
        let unique = set.unique_chunks();
        let text = render_digest(&groups, set.len(), unique);

        Some(Digest::new(text, set.len(), unique, groups.len()))
    }

    /// Accumulate and render the digest for a transcript
    pub fn build(&self, messages: &[Message]) -> (Option<Digest>, AccumulationStats) {
        let (set, stats) = accumulate(messages);
        (self.render(&set), stats)
    }

    /// Build the digest and insert it ahead of the next reasoning step
    pub fn prepare(&self, messages: &[Message]) -> PreparedContext {
        let (digest, stats) = self.build(messages);
        metrics::record_accumulation(&stats);

        let messages = match &digest {
            Some(d) => {
                metrics::record_digest(d.items, d.unique_chunks, d.documents);
                inject_digest(messages, &d.text)
            }
            None => messages.to_vec(),
        };

        PreparedContext {
            messages,
            digest,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<Message> {
        vec![
            Message::user("What does document A say about throughput?"),
            Message::tool(
                "c1",
                "search",
                "[A | doc:a] #s1 pos=1\nThroughput is 40 req/s.\n\n---\n\n[A | doc:a] #s4 pos=4\nLatency drops after tuning.",
            ),
            Message::tool("c2", "probe", "[A | doc:a] #s1 pos=1\nThroughput is 40 req/s on one node."),
        ]
    }

    #[test]
    fn test_end_to_end_scenario() {
        let builder = DigestBuilder::default();
        let (digest, _) = builder.build(&scenario());
        let digest = digest.unwrap();

        let expected = "== Gathered Evidence (3 items, 2 unique chunks) ==\n\
\n\
[A]\n\
\x20 (Note: chunks are non-consecutive - may have gaps)\n\
\x20 #s1 @1:\n\
\x20   [searched] Throughput is 40 req/s.\n\
\x20   [probed] Throughput is 40 req/s on one node.\n\
\x20 #s4 @4:\n\
\x20   [searched] Latency drops after tuning.\n\
\n\
Use [ref:CHUNK_ID] to cite. Only cite chunks that are relevant to the question.";

        assert_eq!(digest.text, expected);
        assert_eq!(digest.items, 3);
        assert_eq!(digest.unique_chunks, 2);
        assert_eq!(digest.documents, 1);
    }

    #[test]
    fn test_render_is_idempotent() {
        let builder = DigestBuilder::default();
        let (a, _) = builder.build(&scenario());
        let (b, _) = builder.build(&scenario());
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_do_not_double_count() {
        let mut messages = scenario();
        messages.push(Message::tool("c3", "search", "[A | doc:a] #s4 pos=4\nLatency drops after tuning."));

        let (digest, stats) = DigestBuilder::default().build(&messages);
        let digest = digest.unwrap();
        assert_eq!(digest.items, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(digest.text.matches("#s4 @4:").count(), 1);
    }

    #[test]
    fn test_consecutive_positions_have_no_gap_note() {
        let messages = vec![Message::tool(
            "c1",
            "search",
            "[A] #x pos=1\none\n\n---\n\n[A] #y pos=2\ntwo\n\n---\n\n[A] #z pos=3\nthree",
        )];
        let (digest, _) = DigestBuilder::default().build(&messages);
        assert!(!digest.unwrap().text.contains(GAP_NOTE));
    }

    #[test]
    fn test_multiple_documents_get_consistency_note() {
        let messages = vec![Message::tool(
            "c1",
            "search",
            "[A | doc:a] #x pos=1\none\n\n---\n\n[B | doc:b] #y pos=1\ntwo",
        )];
        let (digest, _) = DigestBuilder::default().build(&messages);
        let digest = digest.unwrap();
        assert_eq!(digest.documents, 2);
        assert!(digest.text.contains(MULTI_DOCUMENT_NOTE));
    }

    #[test]
    fn test_no_evidence_passes_transcript_through() {
        let messages = vec![
            Message::user("q"),
            Message::tool("c1", "search", "No relevant documents found."),
        ];
        let prepared = DigestBuilder::default().prepare(&messages);
        assert!(prepared.digest.is_none());
        assert_eq!(prepared.messages, messages);
    }

    #[test]
    fn test_prepare_injects_before_question() {
        let mut messages = scenario();
        messages.push(Message::user("And latency?"));

        let prepared = DigestBuilder::default().prepare(&messages);
        let n = prepared.messages.len();
        assert_eq!(n, messages.len() + 1);
        assert!(matches!(&prepared.messages[n - 2], Message::System { content } if content.starts_with("== Gathered Evidence")));
        assert_eq!(prepared.messages[n - 1], Message::user("And latency?"));
    }

    #[test]
    fn test_long_facets_are_truncated_in_digest() {
        let long = "w".repeat(301);
        let messages = vec![Message::tool("c1", "search", format!("[A] #x pos=1\n{long}"))];
        let (digest, _) = DigestBuilder::default().build(&messages);
        let text = digest.unwrap().text;
        assert!(text.contains(&format!("[searched] {}...", "w".repeat(300))));
        assert!(!text.contains(&long));
    }
}
