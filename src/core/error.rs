//! Error types for the conversational core.

use crate::core::language::Language;
use std::time::Duration;
use uuid::Uuid;

/// Failures of the external model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API key is not configured")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// Failures of the knowledge retrieval engine.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge base I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding error: {0}")]
    Embedding(#[from] ModelError),
    #[error("embedding response did not match the request ({expected} inputs, {actual} vectors)")]
    EmbeddingMismatch { expected: usize, actual: usize },
}

/// Per-file text extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported file type: .{0}")]
    Unsupported(String),
    #[error("no OCR backend is configured for image files")]
    NoOcrBackend,
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
}

/// Failure of a single strategy handler. Always recovered by the escalation chain.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// Request-level failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("file validation error: {0}")]
    FileValidation(String),
    #[error("file processing error: {0}")]
    FileProcessing(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl TurnError {
    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            TurnError::Validation(_) => "validation_error",
            TurnError::FileValidation(_) => "file_validation",
            TurnError::FileProcessing(_) => "file_processing",
            TurnError::ConversationNotFound(_) => "not_found",
            TurnError::Persistence(StoreError::ConversationNotFound(_)) => "not_found",
            TurnError::Persistence(_) => "server_error",
        }
    }

    /// Message shown to the user, in the language of the originating request.
    pub fn user_message(&self, language: Language) -> String {
        match (self, language) {
            (TurnError::Validation(msg), _) | (TurnError::FileValidation(msg), _) => msg.clone(),
            (TurnError::FileProcessing(_), Language::German) => {
                "Die Datei konnte nicht verarbeitet werden.".to_owned()
            }
            (TurnError::FileProcessing(_), Language::English) => {
                "The file could not be processed.".to_owned()
            }
            (TurnError::ConversationNotFound(_), Language::German) => {
                "Unterhaltung nicht gefunden.".to_owned()
            }
            (TurnError::ConversationNotFound(_), Language::English) => {
                "Chat not found.".to_owned()
            }
            (TurnError::Persistence(_), Language::German) => {
                "Ein unerwarteter Fehler ist aufgetreten.".to_owned()
            }
            (TurnError::Persistence(_), Language::English) => {
                "An unexpected error occurred.".to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TurnError::Validation("empty".into()).error_code(),
            "validation_error"
        );
        assert_eq!(
            TurnError::FileValidation("too big".into()).error_code(),
            "file_validation"
        );
        assert_eq!(
            TurnError::FileProcessing("boom".into()).error_code(),
            "file_processing"
        );
        assert_eq!(
            TurnError::Persistence(StoreError::Database(sqlx::Error::PoolClosed)).error_code(),
            "server_error"
        );
        assert_eq!(
            TurnError::Persistence(StoreError::ConversationNotFound(Uuid::nil())).error_code(),
            "not_found"
        );
    }

    #[test]
    fn test_user_message_is_language_aware() {
        let err = TurnError::Persistence(StoreError::Database(sqlx::Error::PoolClosed));
        assert_eq!(
            err.user_message(Language::German),
            "Ein unerwarteter Fehler ist aufgetreten."
        );
        assert_eq!(
            err.user_message(Language::English),
            "An unexpected error occurred."
        );
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = TurnError::Validation("Please provide a message or upload a file.".into());
        assert_eq!(
            err.user_message(Language::German),
            "Please provide a message or upload a file."
        );
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "model call timed out after 5s");

        let err = HandlerError::Model(ModelError::MissingApiKey);
        assert_eq!(
            err.to_string(),
            "model call failed: model API key is not configured"
        );
    }
}
