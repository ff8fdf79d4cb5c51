//! Digest injection
//!
//! Places the digest as a system message right before the next reasoning
//! step. Chat APIs require every assistant tool-call message to be followed
//! directly by its tool results, so the digest never lands inside such an
//! exchange.

use crate::transcript::Message;

/// Start of a trailing assistant tool-call exchange that still awaits results
fn open_exchange_start(messages: &[Message]) -> Option<usize> {
    let start = messages
        .iter()
        .rposition(|m| !m.tool_calls().is_empty())?;
    let tail = &messages[start + 1..];

    if !tail.iter().all(Message::is_tool_result) {
        return None;
    }

    let answered = |id: &str| {
        tail.iter()
            .any(|m| matches!(m, Message::Tool { tool_call_id, .. } if tool_call_id == id))
    };
    let complete = messages[start].tool_calls().iter().all(|c| answered(&c.id));

    (!complete).then_some(start)
}

/// Index at which a digest message may be inserted
pub fn insertion_index(messages: &[Message]) -> usize {
    let Some(last) = messages.last() else {
        return 0;
    };

    let idx = if last.is_user() {
        messages.len() - 1
    } else {
        messages.len()
    };

    open_exchange_start(&messages[..idx]).unwrap_or(idx)
}

/// Whether inserting at `idx` would separate a tool call from its result
fn splits_tool_exchange(messages: &[Message], idx: usize) -> bool {
    messages.get(idx).map(Message::is_tool_result).unwrap_or(false)
}

/// Return a copy of the transcript with `digest` inserted as a system message
pub fn inject_digest(messages: &[Message], digest: &str) -> Vec<Message> {
    let idx = insertion_index(messages);
    debug_assert!(!splits_tool_exchange(messages, idx));
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.extend_from_slice(&messages[..idx]);
    out.push(Message::system(digest));
    out.extend_from_slice(&messages[idx..]);
    out
}
