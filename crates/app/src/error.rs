use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use padel_db::{BookingError, SLOT_CONFLICT_MESSAGE};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors a handler can return. Anything that is not a booking conflict is
/// reported as a generic 500, including bodies that fail to decode.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", SLOT_CONFLICT_MESSAGE)]
    SlotConflict,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotConflict => ApiError::SlotConflict,
            BookingError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Internal(anyhow::Error::new(rejection).context("invalid request body"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::SlotConflict => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": SLOT_CONFLICT_MESSAGE })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!("{err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
