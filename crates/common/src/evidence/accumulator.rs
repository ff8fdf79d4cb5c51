//! Evidence accumulator
//!
//! Folds every evidence-producing tool result in a transcript into a
//! deduplicated, order-stable evidence set. The fold is a pure function of the
//! transcript, so it is rerun before each model call instead of being stored.

use super::parser::parse_chunks;
use super::record::{ChunkRecord, ChunkSource};
use crate::transcript::Message;
use serde::Serialize;
use std::collections::HashSet;

/// Deduplicated chunk records in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    records: Vec<ChunkRecord>,
}

impl EvidenceSet {
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct chunk ids, regardless of facet
    pub fn unique_chunks(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.chunk_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Counters describing one accumulation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccumulationStats {
    /// Evidence tool results examined
    pub considered: usize,
    /// Results skipped as failures or empty answers
    pub skipped_failures: usize,
    /// Records dropped because their (chunk, source) was already present
    pub duplicates: usize,
}

/// Whether tool content signals a failure or an empty answer
pub fn is_failure_content(content: &str) -> bool {
    content.contains("Error") || content.starts_with("No ")
}

/// Incremental fold state; `accumulate` is the usual entry point
#[derive(Debug, Default)]
pub struct Accumulator {
    set: EvidenceSet,
    seen: HashSet<(String, ChunkSource)>,
    stats: AccumulationStats,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tool result into the set
    pub fn push_tool_result(&mut self, tool_name: &str, content: &str) {
        let Some(source) = ChunkSource::from_tool_name(tool_name) else {
            return;
        };
        self.stats.considered += 1;

        if is_failure_content(content) {
            self.stats.skipped_failures += 1;
            return;
        }

        for record in parse_chunks(content, source) {
            if self.seen.insert((record.chunk_id.clone(), record.source)) {
                self.set.records.push(record);
            } else {
                self.stats.duplicates += 1;
            }
        }
    }

    pub fn finish(self) -> (EvidenceSet, AccumulationStats) {
        (self.set, self.stats)
    }
}

/// Rebuild the evidence set from a full transcript
pub fn accumulate(messages: &[Message]) -> (EvidenceSet, AccumulationStats) {
    let mut acc = Accumulator::new();
    for message in messages {
        if let Message::Tool { name, content, .. } = message {
            acc.push_tool_result(name, content);
        }
    }

    let (set, stats) = acc.finish();
    tracing::debug!(
        records = set.len(),
        considered = stats.considered,
        skipped = stats.skipped_failures,
        duplicates = stats.duplicates,
        "Evidence accumulated"
    );
    (set, stats)
}
