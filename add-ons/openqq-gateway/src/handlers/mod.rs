//! Request handlers for the public API and the error envelope they share.

pub(crate) mod ask;
pub(crate) mod autotag;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openqq_core::{InputError, TagError};

/// Failure surfaced to the HTTP caller as `{"error": "..."}`.
#[derive(Debug)]
pub(crate) enum ApiError {
    Input(InputError),
    Tag(TagError),
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        ApiError::Input(e)
    }
}

impl From<TagError> for ApiError {
    fn from(e: TagError) -> Self {
        ApiError::Tag(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(InputError::ImageTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Tag(TagError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Tag(TagError::Model(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Tag(TagError::Inference(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Input(e) => e.to_string(),
            ApiError::Tag(e) => e.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(target: "openqq::gateway", status = status.as_u16(), error = %message, "request failed");
        } else {
            tracing::debug!(target: "openqq::gateway", status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(ApiError::from(InputError::MissingPrompt).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(InputError::MissingImage).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(InputError::ImageTooLarge).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(TagError::Decode("bad".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(TagError::Model("no weights".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(TagError::Inference("nan".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
