//! Error responses

use crate::core::error::{StoreError, TurnError};
use crate::core::formatter::{ErrorBody, format_error_response};
use crate::core::language::Language;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, error_code: &'static str) -> Self {
        ApiError {
            status,
            body: format_error_response(message, error_code),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, message, "not_found")
    }

    /// Maps a turn failure, with the user-facing message in `language`.
    pub fn from_turn(err: TurnError, language: Language) -> Self {
        let status = match &err {
            TurnError::Validation(_)
            | TurnError::FileValidation(_)
            | TurnError::FileProcessing(_) => StatusCode::BAD_REQUEST,
            TurnError::ConversationNotFound(_)
            | TurnError::Persistence(StoreError::ConversationNotFound(_)) => StatusCode::NOT_FOUND,
            TurnError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Turn failed: {err}");
        }

        ApiError::new(status, err.user_message(language), err.error_code())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(_) => ApiError::not_found("Chat not found."),
            StoreError::Database(e) => {
                error!("Database error: {e}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.",
                    "server_error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
