//! Conversations endpoints

use crate::api::conversations::schemas::{
    ConversationDetail, ConversationList, ConversationSummary, CreateConversation,
};
use crate::api::error::ApiError;
use crate::core::traits::ConversationService;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use uuid::Uuid;

const LIST_LIMIT: u32 = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_conversations).post(new_conversation))
        .route("/:id", get(get_conversation).delete(delete_conversation))
}

async fn list_conversations(
    Inject(conversation_service): Inject<dyn ConversationService>,
) -> Result<Json<ConversationList>, ApiError> {
    let conversations = conversation_service.list_conversations(LIST_LIMIT).await?;

    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let turn_count = conversation_service.count_turns(conversation.id).await?;
        summaries.push(ConversationSummary::new(conversation, turn_count));
    }

    Ok(Json(ConversationList {
        conversations: summaries,
    }))
}

async fn new_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    Json(create_conversation): Json<CreateConversation>,
) -> Result<(StatusCode, Json<ConversationSummary>), ApiError> {
    let title = create_conversation
        .title
        .map(|title| title.trim().to_owned())
        .filter(|title| !title.is_empty());
    let conversation = conversation_service.create_conversation(title).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationSummary::new(conversation, 0)),
    ))
}

async fn get_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let conversation = conversation_service.get_conversation(conversation_id).await?;
    let turns = conversation_service.list_turns(conversation_id).await?;

    Ok(Json(ConversationDetail::new(conversation, turns)))
}

async fn delete_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    conversation_service
        .delete_conversation(conversation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub mod schemas {
    use crate::infrastructure::entities::{self, FileInfo, TurnRole};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug, Default)]
    pub struct CreateConversation {
        #[serde(default)]
        pub title: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct ConversationSummary {
        pub id: Uuid,
        pub title: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
        pub turn_count: i64,
    }

    impl ConversationSummary {
        pub fn new(conversation: entities::Conversation, turn_count: i64) -> Self {
            ConversationSummary {
                id: conversation.id,
                title: conversation.title,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
                turn_count,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ConversationList {
        pub conversations: Vec<ConversationSummary>,
    }

    #[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    impl From<TurnRole> for Role {
        fn from(role: TurnRole) -> Self {
            match role {
                TurnRole::User => Role::User,
                TurnRole::Assistant => Role::Assistant,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Turn {
        pub id: Uuid,
        pub role: Role,
        pub content: String,
        pub created_at: DateTime<Utc>,
        pub sources: Vec<String>,
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub used_knowledge_base: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub file_info: Option<FileInfo>,
    }

    impl From<entities::Turn> for Turn {
        fn from(turn: entities::Turn) -> Self {
            Turn {
                id: turn.id,
                role: turn.role.into(),
                content: turn.content,
                created_at: turn.created_at,
                sources: turn.sources.0,
                kind: turn.kind.as_str(),
                used_knowledge_base: turn.used_knowledge_base,
                file_info: turn.file_info.map(|info| info.0),
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ConversationDetail {
        pub id: Uuid,
        pub title: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
        pub document_context: Option<String>,
        pub turns: Vec<Turn>,
    }

    impl ConversationDetail {
        pub fn new(conversation: entities::Conversation, turns: Vec<entities::Turn>) -> Self {
            ConversationDetail {
                id: conversation.id,
                title: conversation.title,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
                document_context: conversation.document_context,
                turns: turns.into_iter().map(Turn::from).collect(),
            }
        }
    }
}
