//! Knowledge base overview
//!
//! Gives the model the titles and table-of-contents headings of the sources
//! it can search, so its first queries are targeted. Injected once per
//! transcript.

use crate::transcript::Message;
use serde::{Deserialize, Serialize};

pub const OVERVIEW_MARKER: &str = "Knowledge Base Overview";

/// One heading of a source's table of contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocHeading {
    #[serde(default = "default_level")]
    pub level: usize,
    #[serde(default)]
    pub text: String,
}

fn default_level() -> usize {
    1
}

/// A source available to the retrieval tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOverview {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub toc: Vec<TocHeading>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

/// Format the overview section, empty when there are no sources
pub fn format_sources_overview(sources: &[SourceOverview]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        format!("\n## {OVERVIEW_MARKER}\n"),
        "The following sources are available in the knowledge base:\n".to_string(),
    ];

    for source in sources {
        lines.push(format!("### {}", source.title));
        for heading in &source.toc {
            let indent = "  ".repeat(heading.level.saturating_sub(1));
            lines.push(format!("{indent}- {}", heading.text));
        }
        lines.push(String::new());
    }

    lines.push("Use this overview to target your searches effectively.\n".to_string());
    lines.join("\n")
}

/// Prepend the overview unless the transcript already carries one
pub fn inject_sources_overview(messages: &[Message], sources: &[SourceOverview]) -> Vec<Message> {
    let already_present = messages
        .iter()
        .any(|m| matches!(m, Message::System { content } if content.contains(OVERVIEW_MARKER)));

    let overview = format_sources_overview(sources);
    if already_present || overview.is_empty() {
        return messages.to_vec();
    }

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(Message::system(overview));
    out.extend_from_slice(messages);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<SourceOverview> {
        vec![SourceOverview {
            title: "Operations Manual".into(),
            toc: vec![
                TocHeading { level: 1, text: "Setup".into() },
                TocHeading { level: 2, text: "Networking".into() },
            ],
        }]
    }

    #[test]
    fn test_format_indents_by_level() {
        let text = format_sources_overview(&sources());
        assert!(text.contains("### Operations Manual\n- Setup\n  - Networking\n"));
        assert!(text.contains(OVERVIEW_MARKER));
        assert!(format_sources_overview(&[]).is_empty());
    }

    #[test]
    fn test_injected_once() {
        let messages = vec![Message::user("what is the setup?")];
        let once = inject_sources_overview(&messages, &sources());
        assert_eq!(once.len(), 2);
        assert!(matches!(once[0], Message::System { .. }));

        let twice = inject_sources_overview(&once, &sources());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let parsed: SourceOverview = serde_json::from_str(r#"{"toc":[{"text":"Intro"}]}"#).unwrap();
        assert_eq!(parsed.title, "Untitled");
        assert_eq!(parsed.toc[0].level, 1);
    }
}
