//! Evidence digest handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use ragtrail_common::{
    errors::{AppError, Result},
    evidence::{inject_sources_overview, AccumulationStats, Digest, SourceOverview},
    transcript::Message,
};

/// Digest request
#[derive(Debug, Deserialize, Validate)]
pub struct DigestRequest {
    #[validate(length(min = 1, max = 2000))]
    pub messages: Vec<Message>,

    /// Sources for the one-time knowledge base overview
    #[serde(default)]
    pub sources: Vec<SourceOverview>,
}

/// Digest response
#[derive(Serialize)]
pub struct DigestResponse {
    /// Transcript ready for the next model call
    pub messages: Vec<Message>,
    pub digest: Option<Digest>,
    pub stats: AccumulationStats,
}

/// Rebuild the evidence digest and place it ahead of the next reasoning step
pub async fn prepare_digest(
    State(state): State<AppState>,
    Json(request): Json<DigestRequest>,
) -> Result<Json<DigestResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("messages".to_string()),
    })?;

    let messages = inject_sources_overview(&request.messages, &request.sources);
    let prepared = state.digest.prepare(&messages);

    tracing::debug!(
        items = prepared.digest.as_ref().map_or(0, |d| d.items),
        fingerprint = prepared.digest.as_ref().map(|d| d.fingerprint.as_str()),
        skipped = prepared.stats.skipped_failures,
        "Digest prepared"
    );

    Ok(Json(DigestResponse {
        messages: prepared.messages,
        digest: prepared.digest,
        stats: prepared.stats,
    }))
}
