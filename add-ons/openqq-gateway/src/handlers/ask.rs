//! POST /api/ask

use super::ApiError;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use openqq_core::require_prompt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct AskRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AskResponse {
    response: String,
}

/// Resolves a prompt through cache, knowledge base and generative fallback.
///
/// A body that is not JSON (or has no usable `prompt`) is rejected the same way as an empty
/// prompt; everything past validation answers 200, degraded model calls included.
pub(crate) async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let prompt = body.ok().and_then(|Json(req)| req.prompt);
    let prompt = require_prompt(prompt)?;

    let resolution = state.orchestrator.resolve_text(&prompt).await;
    tracing::info!(
        target: "openqq::gateway",
        source = ?resolution.source,
        chars = resolution.response.len(),
        "ask answered"
    );
    Ok(Json(AskResponse {
        response: resolution.response,
    }))
}
