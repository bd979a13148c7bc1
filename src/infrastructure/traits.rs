//! Infrastructure traits, used for DI on higher levels

use crate::core::error::StoreError;
use crate::infrastructure::entities;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create_conversation(
        &self,
        conversation: entities::Conversation,
    ) -> Result<entities::Conversation, StoreError>;

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<entities::Conversation>, StoreError>;

    /// The most recently updated conversation, if any.
    async fn latest_conversation(&self) -> Result<Option<entities::Conversation>, StoreError>;

    /// Conversations ordered by last update, newest first.
    async fn list_conversations(
        &self,
        limit: u32,
    ) -> Result<Vec<entities::Conversation>, StoreError>;

    /// Deletes the conversation and its turns. Returns `false` if it did not exist.
    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, StoreError>;

    async fn update_title(&self, conversation_id: Uuid, title: &str) -> Result<(), StoreError>;

    /// `None` leaves the respective column unchanged.
    async fn update_context(
        &self,
        conversation_id: Uuid,
        active_form: Option<&str>,
        document_context: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_turn(&self, turn: entities::Turn) -> Result<entities::Turn, StoreError>;

    /// The last `limit` turns, in chronological order.
    async fn list_recent_turns(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<entities::Turn>, StoreError>;

    async fn list_turns(&self, conversation_id: Uuid) -> Result<Vec<entities::Turn>, StoreError>;

    async fn count_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError>;

    async fn count_user_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError>;
}
