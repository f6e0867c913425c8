//! POST /api/autotag

use super::ApiError;
use crate::AppState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use openqq_core::InputError;
use serde::Serialize;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub(crate) struct AutotagResponse {
    label: String,
}

/// A body cut off by the upload limit is reported as too large, anything else as missing.
fn multipart_failure(e: MultipartError, what: &str) -> InputError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::debug!(target: "openqq::gateway", error = %e, "upload exceeds body limit");
        return InputError::ImageTooLarge;
    }
    tracing::debug!(target: "openqq::gateway", error = %e, "{}", what);
    InputError::MissingImage
}

/// Pulls the bytes of the first non-empty `image` part; other parts are skipped.
async fn read_image(mut multipart: Multipart) -> Result<Vec<u8>, InputError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(InputError::MissingImage),
            Err(e) => return Err(multipart_failure(e, "malformed multipart body")),
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        match field.bytes().await {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes.to_vec()),
            Ok(_) => return Err(InputError::MissingImage),
            Err(e) => return Err(multipart_failure(e, "image part unreadable")),
        }
    }
}

/// Classifies the uploaded image into one of the configured labels.
pub(crate) async fn autotag(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AutotagResponse>, ApiError> {
    let multipart = multipart.map_err(|_| InputError::MissingImage)?;
    let image = read_image(multipart).await?;
    let label = state.orchestrator.classify_image(image).await?;
    Ok(Json(AutotagResponse { label }))
}
