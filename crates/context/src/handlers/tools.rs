//! Tool catalogue handler

use axum::Json;
use ragtrail_common::retrieval::tool_definitions;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<Value>,
}

/// Tool schemas for the orchestrator's model calls
pub async fn list_tools() -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: tool_definitions(),
    })
}
