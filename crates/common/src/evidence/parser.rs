//! Chunk record parser
//!
//! Tool output is a list of entries joined by `\n\n---\n\n`. Each entry starts
//! with a header line:
//!
//! ```text
//! [<display_name>( | doc:<doc_id>)?] #<chunk_id>( pos=<int>)?
//! <free-text content>
//! ```
//!
//! Entries whose first line does not match are dropped without error, since
//! partial or garbled tool text is expected.

use super::record::{ChunkRecord, ChunkSource};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Separator between entries in tool output
pub const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[([^|\]\n]+)(?:\s*\|\s*doc:([^\]\n]+))?\]\s*#(\w+)(?:\s+pos=(\d+))?")
            .expect("header pattern is valid")
    })
}

/// Parse one tool-output string into chunk records
pub fn parse_chunks(output: &str, source: ChunkSource) -> Vec<ChunkRecord> {
    output
        .split(ENTRY_SEPARATOR)
        .filter_map(|entry| parse_entry(entry, source))
        .collect()
}

/// Parse a single entry, `None` when the header does not match
pub fn parse_entry(entry: &str, source: ChunkSource) -> Option<ChunkRecord> {
    let header_line = entry.lines().next()?;
    let caps = header_pattern().captures(header_line)?;

    let document_name = caps.get(1)?.as_str().trim().to_string();
    let document_id = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty());
    let chunk_id = caps.get(3)?.as_str().to_string();
    // Out-of-range positions are treated as absent
    let position = caps.get(4).and_then(|m| m.as_str().parse::<u32>().ok());

    let content = entry
        .split_once('\n')
        .map(|(_, body)| body.trim().to_string())
        .unwrap_or_default();

    Some(ChunkRecord {
        chunk_id,
        document_id,
        document_name,
        content,
        source,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_header() {
        let records = parse_chunks(
            "[Annual Report | doc:d-17] #a1b2 pos=4\nRevenue grew 12%.",
            ChunkSource::Search,
        );
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.document_name, "Annual Report");
        assert_eq!(r.document_id.as_deref(), Some("d-17"));
        assert_eq!(r.chunk_id, "a1b2");
        assert_eq!(r.position, Some(4));
        assert_eq!(r.content, "Revenue grew 12%.");
        assert_eq!(r.source, ChunkSource::Search);
    }

    #[test]
    fn test_optional_parts_missing() {
        let records = parse_chunks("[Notes.md] #c9\nbody", ChunkSource::Probe);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_id, None);
        assert_eq!(records[0].position, None);
        assert_eq!(records[0].source, ChunkSource::Probe);
    }

    #[test]
    fn test_multiple_entries_and_garbage() {
        let output = [
            "[A | doc:1] #x1 pos=1\nfirst",
            "garbled entry without header",
            "== Probed Context ==",
            "[A | doc:1] #x2 pos=2\nsecond\n\nwith paragraphs",
        ]
        .join(ENTRY_SEPARATOR);

        let records = parse_chunks(&output, ChunkSource::Search);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].chunk_id, "x1");
        assert_eq!(records[1].chunk_id, "x2");
        assert_eq!(records[1].content, "second\n\nwith paragraphs");
    }

    #[test]
    fn test_header_only_entry_has_empty_content() {
        let records = parse_chunks("[A] #x1 pos=3", ChunkSource::Search);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "");
    }

    #[test]
    fn test_header_must_start_the_entry() {
        assert!(parse_chunks("see [A] #x1\ntext", ChunkSource::Search).is_empty());
        assert!(parse_chunks("", ChunkSource::Search).is_empty());
        assert!(parse_chunks("No relevant information found.", ChunkSource::Search).is_empty());
    }

    #[test]
    fn test_header_is_first_line_only() {
        // A header-looking second line does not rescue a bad first line
        let records = parse_chunks("intro text\n[A] #x1\nbody", ChunkSource::Search);
        assert!(records.is_empty());
    }

    #[test]
    fn test_overflowing_position_is_absent() {
        let records = parse_chunks("[A] #x1 pos=99999999999\ntext", ChunkSource::Search);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].position, None);
    }

    #[test]
    fn test_whitespace_around_doc_id() {
        let records = parse_chunks("[Spec Sheet  |  doc: 77 ] #z\ntext", ChunkSource::Search);
        assert_eq!(records[0].document_name, "Spec Sheet");
        assert_eq!(records[0].document_id.as_deref(), Some("77"));
    }
}
