//! Retrieval tools exposed to the agent
//!
//! Maps transcript tool calls onto gateway operations and turns every answer,
//! including failures, into a `tool` message. Calls of one turn run
//! concurrently and come back in call order.

use super::format::{self, NO_DATASETS};
use super::{Direction, RetrievalGateway, Scope};
use crate::errors::{AppError, Result};
use crate::evidence::is_failure_content;
use crate::metrics;
use crate::session::SessionScope;
use crate::transcript::{Message, ToolCall};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info_span, warn, Instrument};

pub const EXPLORE: &str = "explore";
pub const SEARCH: &str = "search";
pub const PROBE: &str = "probe";

/// Upper bound on chunks per probe side
pub const MAX_PROBE_COUNT: usize = 20;

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

fn default_direction() -> String {
    Direction::Both.as_str().to_string()
}

fn default_count() -> usize {
    2
}

#[derive(Deserialize)]
struct ProbeArgs {
    chunk_id: String,
    #[serde(default = "default_direction")]
    direction: String,
    #[serde(default = "default_count")]
    count: usize,
}

/// A validated tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    Explore,
    Search {
        query: String,
    },
    Probe {
        chunk_id: String,
        direction: Direction,
        count: usize,
    },
}

fn invalid(tool: &str, message: impl Into<String>) -> AppError {
    AppError::InvalidToolCall {
        tool: tool.to_string(),
        message: message.into(),
    }
}

/// Some models send arguments as a JSON string instead of an object
fn arguments_object(call: &ToolCall) -> Result<Value> {
    match &call.arguments {
        Value::String(raw) if raw.trim().is_empty() => Ok(json!({})),
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|e| invalid(&call.name, format!("arguments are not JSON: {e}")))
        }
        Value::Null => Ok(json!({})),
        other => Ok(other.clone()),
    }
}

impl ToolInvocation {
    /// Validate a tool call's name and arguments
    pub fn parse(call: &ToolCall) -> Result<Self> {
        let args = arguments_object(call)?;

        match call.name.as_str() {
            EXPLORE => Ok(ToolInvocation::Explore),
            SEARCH => {
                let SearchArgs { query } = serde_json::from_value(args)
                    .map_err(|e| invalid(SEARCH, e.to_string()))?;
                let query = query.trim().to_string();
                if query.is_empty() {
                    return Err(invalid(SEARCH, "query must not be empty"));
                }
                Ok(ToolInvocation::Search { query })
            }
            PROBE => {
                let ProbeArgs {
                    chunk_id,
                    direction,
                    count,
                } = serde_json::from_value(args).map_err(|e| invalid(PROBE, e.to_string()))?;
                let chunk_id = chunk_id.trim().trim_start_matches('#').to_string();
                if chunk_id.is_empty() {
                    return Err(invalid(PROBE, "chunk_id must not be empty"));
                }
                let direction = direction.parse::<Direction>()?;
                if !(1..=MAX_PROBE_COUNT).contains(&count) {
                    return Err(invalid(
                        PROBE,
                        format!("count must be between 1 and {MAX_PROBE_COUNT}"),
                    ));
                }
                Ok(ToolInvocation::Probe {
                    chunk_id,
                    direction,
                    count,
                })
            }
            other => Err(invalid(other, "unknown tool")),
        }
    }
}

/// JSON-schema descriptions of the tools, in chat-completions format
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": EXPLORE,
                "description": "Explore the knowledge base to see available documents. Use this to understand what sources are available before searching.",
                "parameters": {"type": "object", "properties": {}}
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": SEARCH,
                "description": "Search the knowledge base for relevant information. Returns chunks with chunk IDs that can be used with probe() to validate relevance.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Keywords or question to search for"}
                    },
                    "required": ["query"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": PROBE,
                "description": "Probe surrounding context to validate chunk relevance. Use this to verify a search result is truly relevant before citing it.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "chunk_id": {"type": "string", "description": "The chunk ID from search results"},
                        "direction": {
                            "type": "string",
                            "enum": ["before", "after", "both"],
                            "default": "both"
                        },
                        "count": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PROBE_COUNT,
                            "default": 2
                        }
                    },
                    "required": ["chunk_id"]
                }
            }
        }),
    ]
}

/// Executes tool calls against a gateway
#[derive(Debug, Clone)]
pub struct ToolRunner {
    gateway: Arc<RetrievalGateway>,
}

impl ToolRunner {
    pub fn new(gateway: Arc<RetrievalGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &RetrievalGateway {
        &self.gateway
    }

    async fn dispatch(&self, invocation: &ToolInvocation, scope: &Scope) -> Result<String> {
        if !self.gateway.is_configured() {
            return Err(AppError::BackendNotConfigured);
        }
        if scope.is_empty() {
            return Ok(NO_DATASETS.to_string());
        }

        match invocation {
            ToolInvocation::Explore => {
                let listings = self.gateway.explore(scope).await?;
                Ok(format::format_explore(&listings))
            }
            ToolInvocation::Search { query } => {
                let chunks = self.gateway.search(query, scope).await?;
                Ok(format::format_search(&chunks))
            }
            ToolInvocation::Probe {
                chunk_id,
                direction,
                count,
            } => {
                let window = self.gateway.probe(chunk_id, *direction, *count, scope).await?;
                Ok(format::format_probe(chunk_id, *direction, window.as_ref()))
            }
        }
    }

    /// Run one call; failures become `Error: ...` content
    pub async fn run(&self, call: &ToolCall, scope: &Scope) -> Message {
        let start = Instant::now();
        let span = info_span!("tool_call", tool = %call.name, call_id = %call.id);

        let result = async {
            let invocation = ToolInvocation::parse(call)?;
            self.dispatch(&invocation, scope).await
        }
        .instrument(span)
        .await;

        let (content, outcome) = match result {
            Ok(content) if is_failure_content(&content) => (content, "empty"),
            Ok(content) => (content, "ok"),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                (format::format_error(&e), "error")
            }
        };

        metrics::record_tool_call(&call.name, outcome, start.elapsed().as_secs_f64());
        Message::tool(call.id.clone(), call.name.clone(), content)
    }

    /// Run every call of one turn concurrently, results in call order
    ///
    /// If the session closes first, nothing is returned.
    pub async fn run_batch(
        &self,
        calls: &[ToolCall],
        scope: &Scope,
        session: &SessionScope,
    ) -> Result<Vec<Message>> {
        let token = session.token();
        if token.is_cancelled() {
            return Err(session.closed_error());
        }

        let batch = join_all(calls.iter().map(|call| self.run(call, scope)));

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(session.closed_error()),
            messages = batch => Ok(messages),
        }
    }
}
