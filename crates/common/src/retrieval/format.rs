//! Tool output formatting
//!
//! Search and probe results are written as chunk entries in the header
//! grammar read back by the evidence parser:
//!
//! ```text
//! [<document name> | doc:<document id>] #<chunk id> pos=<position>
//! <content>
//! ```
//!
//! Entries are joined by `ENTRY_SEPARATOR`. Empty answers and failures are
//! plain sentences the evidence accumulator recognises and skips.

use super::{ChunkInfo, DatasetListing, Direction, ProbeWindow};
use crate::errors::AppError;
use crate::evidence::ENTRY_SEPARATOR;

pub const NOT_CONFIGURED: &str = "No retrieval backend configured. Set APP__RETRIEVAL__API_KEY.";
pub const NO_DATASETS: &str = "No datasets configured.";
pub const NO_DOCUMENTS: &str = "No documents found in configured datasets.";
pub const NO_RESULTS: &str = "No relevant information found. Try different keywords.";

/// Documents listed per dataset by `explore`
pub const MAX_LISTED_DOCUMENTS: usize = 15;

/// Characters that would end a header field early
fn header_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '|' | ']' | '[' | '\n' | '\r' => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// One chunk entry
pub fn format_entry(chunk: &ChunkInfo) -> String {
    let mut name = header_safe(&chunk.document_name);
    if name.is_empty() {
        name = "Unknown".to_string();
    }

    let mut header = match chunk.document_id.as_deref().map(header_safe) {
        Some(id) if !id.is_empty() => format!("[{name} | doc:{id}]"),
        _ => format!("[{name}]"),
    };

    if !chunk.id.is_empty() {
        header.push_str(&format!(" #{}", chunk.id));
        if let Some(pos) = chunk.position {
            header.push_str(&format!(" pos={pos}"));
        }
    }

    format!("{header}\n{}", chunk.content)
}

/// Entries joined by the separator
pub fn format_chunks(chunks: &[ChunkInfo]) -> String {
    chunks
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// Output of `search`
pub fn format_search(chunks: &[ChunkInfo]) -> String {
    if chunks.is_empty() {
        return NO_RESULTS.to_string();
    }
    format_chunks(chunks)
}

/// Output of `probe`; a banner entry precedes the chunks
pub fn format_probe(chunk_id: &str, direction: Direction, window: Option<&ProbeWindow>) -> String {
    match window {
        Some(w) if !w.chunks.is_empty() => {
            let banner = format!(
                "== Probed Context ({direction} #{chunk_id}) from [{}] ==",
                header_safe(&w.document_name)
            );
            format!("{banner}{ENTRY_SEPARATOR}{}", format_chunks(&w.chunks))
        }
        _ => format!("No {direction} chunks found for #{chunk_id}."),
    }
}

/// Output of `explore`
pub fn format_explore(listings: &[DatasetListing]) -> String {
    if listings.iter().all(|l| l.documents.is_empty()) {
        return NO_DOCUMENTS.to_string();
    }

    let mut lines = vec!["== Available Documents ==\n".to_string()];
    for listing in listings {
        lines.push(format!("[{}]", listing.dataset.name));
        for doc in listing.documents.iter().take(MAX_LISTED_DOCUMENTS) {
            lines.push(format!("  - {} ({} chunks)", doc.name, doc.chunk_count));
        }
        if listing.documents.len() > MAX_LISTED_DOCUMENTS {
            lines.push(format!(
                "  ... and {} more",
                listing.documents.len() - MAX_LISTED_DOCUMENTS
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Tool content for a failed call
pub fn format_error(error: &AppError) -> String {
    match error {
        AppError::BackendNotConfigured => NOT_CONFIGURED.to_string(),
        AppError::Validation { message, .. }
        | AppError::InvalidToolCall { message, .. }
        | AppError::RetrievalError { message } => format!("Error: {message}"),
        other => format!("Error: {other}"),
    }
}
