//! Implementations for the service the app needs.
//!

use crate::core::error::StoreError;
use crate::core::title::{DOCUMENT_TITLE, generate_title};
use crate::core::traits::{ConversationService, NewTurn};
use crate::infrastructure::entities::{Conversation, Turn, TurnRole};
use crate::infrastructure::traits::ConversationRepository;
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::info;
use sqlx::types::Json;
use uuid::Uuid;

#[injectable(ConversationService)]
pub struct StoredConversationService {
    repo: Ref<dyn ConversationRepository>,
}

impl StoredConversationService {
    pub fn new(repo: Ref<dyn ConversationRepository>) -> Self {
        StoredConversationService { repo }
    }

    fn title_for(turn: &NewTurn) -> String {
        if turn.content.trim().is_empty() && turn.file_info.is_some() {
            DOCUMENT_TITLE.to_owned()
        } else {
            generate_title(&turn.content)
        }
    }
}

#[async_trait]
impl ConversationService for StoredConversationService {
    async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = self
            .repo
            .create_conversation(Conversation::new(title))
            .await?;
        info!("Created conversation {} - {}", conversation.id, conversation.title);
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, StoreError> {
        self.repo
            .find_conversation(conversation_id)
            .await?
            .ok_or(StoreError::ConversationNotFound(conversation_id))
    }

    async fn get_or_create_default(&self) -> Result<Conversation, StoreError> {
        match self.repo.latest_conversation().await? {
            Some(conversation) => Ok(conversation),
            None => self.create_conversation(None).await,
        }
    }

    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, StoreError> {
        self.repo.list_conversations(limit).await
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), StoreError> {
        if self.repo.delete_conversation(conversation_id).await? {
            info!("Deleted conversation {conversation_id}");
            Ok(())
        } else {
            Err(StoreError::ConversationNotFound(conversation_id))
        }
    }

    async fn append_turn(&self, conversation_id: Uuid, turn: NewTurn) -> Result<Turn, StoreError> {
        let conversation = self.get_conversation(conversation_id).await?;

        let new_title = if turn.role == TurnRole::User
            && self.repo.count_user_turns(conversation_id).await? == 0
        {
            Some(Self::title_for(&turn))
        } else {
            None
        };

        let now = Utc::now();
        let stored = self
            .repo
            .insert_turn(Turn {
                id: Uuid::new_v4(),
                conversation_id,
                role: turn.role,
                used_knowledge_base: turn.used_knowledge_base,
                content: turn.content,
                created_at: now,
                sources: Json(turn.sources),
                kind: turn.kind,
                file_info: turn.file_info.map(Json),
            })
            .await?;

        self.repo.touch_conversation(conversation_id, now).await?;

        if let Some(title) = new_title {
            info!("Naming conversation {conversation_id}: '{}' -> '{title}'", conversation.title);
            self.repo.update_title(conversation_id, &title).await?;
        }

        Ok(stored)
    }

    async fn recent_turns(&self, conversation_id: Uuid, limit: u32) -> Result<Vec<Turn>, StoreError> {
        self.repo.list_recent_turns(conversation_id, limit).await
    }

    async fn list_turns(&self, conversation_id: Uuid) -> Result<Vec<Turn>, StoreError> {
        self.repo.list_turns(conversation_id).await
    }

    async fn count_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError> {
        self.repo.count_turns(conversation_id).await
    }

    async fn update_document_context(
        &self,
        conversation_id: Uuid,
        document_context: &str,
    ) -> Result<(), StoreError> {
        self.repo
            .update_context(conversation_id, None, Some(document_context))
            .await
    }
}
