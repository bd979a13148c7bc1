//! Chat endpoint

use crate::api::chat::schemas::ChatResponse;
use crate::api::error::ApiError;
use crate::config::Settings;
use crate::core::error::TurnError;
use crate::core::formatter::format_chat_response;
use crate::core::orchestrator::{TurnOrchestrator, TurnRequest};
use crate::core::traits::UploadedFile;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::routing::post;
use axum::{Json, Router};
use di_axum::Inject;
use log::{debug, warn};
use std::str::FromStr;
use uuid::Uuid;

pub fn router() -> Router {
    Router::new().route("/", post(chat))
}

/// Multipart fields: `message`, `files` (repeatable), `conversation_id`.
async fn chat(
    Inject(orchestrator): Inject<TurnOrchestrator>,
    Inject(settings): Inject<Settings>,
    multipart: Multipart,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = read_turn_request(multipart).await.map_err(|e| {
        warn!("Rejected chat request: {e}");
        ApiError::from_turn(e, settings.default_language)
    })?;
    debug!(
        "Chat request: message={}, files={}, conversation={:?}",
        request.message.is_some(),
        request.files.len(),
        request.conversation_id
    );

    let language = orchestrator.response_language(request.message.as_deref());
    let turn = orchestrator
        .process_turn(request)
        .await
        .map_err(|e| ApiError::from_turn(e, language))?;

    Ok(Json(ChatResponse {
        formatted: format_chat_response(&turn.response, &turn.sources, turn.kind),
        conversation_id: turn.conversation_id,
        document_text: turn.document_context,
    }))
}

async fn read_turn_request(mut multipart: Multipart) -> Result<TurnRequest, TurnError> {
    let mut request = TurnRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_body)? {
        let name = field.name().map(ToOwned::to_owned);
        match name.as_deref() {
            Some("message") => {
                request.message = Some(field.text().await.map_err(invalid_body)?);
            }
            Some("files") => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(|e| {
                    TurnError::FileProcessing(format!(
                        "Error processing file {filename}: {}",
                        e.body_text()
                    ))
                })?;
                // browsers send an empty part when no file was picked
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                request.files.push(UploadedFile::new(filename, bytes.to_vec()));
            }
            Some("conversation_id") => {
                let value = field.text().await.map_err(invalid_body)?;
                let value = value.trim();
                if !value.is_empty() {
                    let id = Uuid::from_str(value)
                        .map_err(|_| TurnError::Validation("Invalid conversation id".to_owned()))?;
                    request.conversation_id = Some(id);
                }
            }
            other => debug!("Ignoring multipart field {other:?}"),
        }
    }

    Ok(request)
}

fn invalid_body(e: MultipartError) -> TurnError {
    TurnError::Validation(format!("Invalid multipart body: {}", e.body_text()))
}

pub mod schemas {
    use crate::core::formatter::FormattedResponse;
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    pub struct ChatResponse {
        #[serde(flatten)]
        pub formatted: FormattedResponse,
        pub conversation_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub document_text: Option<String>,
    }
}
