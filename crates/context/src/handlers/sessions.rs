//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::AppState;
use ragtrail_common::{
    errors::{AppError, Result},
    retrieval::Scope,
    session::SessionInfo,
    transcript::{Message, ToolCall},
};

/// Datasets a single request may name
const MAX_SCOPE_DATASETS: usize = 64;

/// Create session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub created_at: String,
    pub idle_ttl_secs: u64,
}

/// Run tools request
#[derive(Debug, Deserialize, Validate)]
pub struct RunToolsRequest {
    #[validate(length(min = 1, max = 16))]
    pub tool_calls: Vec<ToolCall>,

    /// Scope for this batch only
    #[serde(default)]
    #[validate(custom(function = "validate_scope"))]
    pub scope: Scope,
}

fn validate_scope(scope: &Scope) -> std::result::Result<(), ValidationError> {
    if scope.dataset_ids.len() > MAX_SCOPE_DATASETS {
        return Err(ValidationError::new("too_many_datasets"));
    }
    if scope.dataset_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ValidationError::new("empty_dataset_id"));
    }
    Ok(())
}

/// Run tools response
#[derive(Serialize)]
pub struct RunToolsResponse {
    pub messages: Vec<Message>,
    pub processing_time_ms: u64,
}

/// Open a new session scope
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let scope = state.registry.open().await;
    let info = SessionInfo::from(scope.as_ref());

    tracing::info!(session_id = %info.id, "Session created");

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: info.id,
            created_at: info.created_at.to_rfc3339(),
            idle_ttl_secs: state.config.sessions.idle_ttl_secs,
        }),
    )
}

/// Close a session, cancelling its in-flight tool calls
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.registry.close(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run one turn's tool calls and return their messages in call order
pub async fn run_tools(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RunToolsRequest>,
) -> Result<Json<RunToolsResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let session = state.registry.touch(session_id).await?;
    let timeout = state.config.request_timeout();

    let messages = tokio::time::timeout(
        timeout,
        state
            .runner
            .run_batch(&request.tool_calls, &request.scope, &session),
    )
    .await
    .map_err(|_| AppError::RetrievalTimeout {
        timeout_ms: timeout.as_millis() as u64,
    })??;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        session_id = %session_id,
        calls = request.tool_calls.len(),
        latency_ms = processing_time_ms,
        "Tool batch completed"
    );

    Ok(Json(RunToolsResponse {
        messages,
        processing_time_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(calls: usize, datasets: Vec<&str>) -> RunToolsRequest {
        RunToolsRequest {
            tool_calls: (0..calls)
                .map(|i| ToolCall {
                    id: format!("c{i}"),
                    name: "explore".into(),
                    arguments: json!({}),
                })
                .collect(),
            scope: Scope::new(datasets.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request(1, vec!["ds"]).validate().is_ok());
        assert!(request(0, vec!["ds"]).validate().is_err());
        assert!(request(17, vec!["ds"]).validate().is_err());
        assert!(request(1, vec![" "]).validate().is_err());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_batch() {
        let state = crate::tests::test_state();
        let (_, Json(created)) = create_session(State(state.clone())).await;
        close_session(State(state.clone()), Path(created.session_id))
            .await
            .unwrap();

        let result = run_tools(
            State(state),
            Path(created.session_id),
            Json(request(1, vec!["ds"])),
        )
        .await;
        assert!(matches!(result, Err(AppError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_explore_through_session() {
        let state = crate::tests::test_state();
        let (_, Json(created)) = create_session(State(state.clone())).await;

        let Json(response) = run_tools(
            State(state),
            Path(created.session_id),
            Json(request(1, vec!["ds"])),
        )
        .await
        .unwrap();

        assert_eq!(response.messages.len(), 1);
        assert!(response.messages[0]
            .content()
            .starts_with("== Available Documents ==\n\n[Manuals]\n  - Ops Guide (3 chunks)"));
    }
}
