//! DB Repository abstractions

use crate::core::error::StoreError;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{Conversation, Turn, TurnRole};
use crate::infrastructure::traits::ConversationRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::error;
use uuid::Uuid;

const TURN_COLUMNS: &str =
    "id, conversation_id, role, content, created_at, sources, kind, used_knowledge_base, file_info";

fn log_err(e: sqlx::Error) -> StoreError {
    error!("{e}");
    StoreError::from(e)
}

#[injectable(ConversationRepository)]
pub struct DbConversationRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbConversationRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> Self {
        DbConversationRepository { connection }
    }
}

#[async_trait]
impl ConversationRepository for DbConversationRepository {
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        sqlx::query_as(
            "INSERT INTO conversations (id, title, created_at, updated_at, active_form, document_context) VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(conversation.id)
        .bind(conversation.title)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .bind(conversation.active_form)
        .bind(conversation.document_context)
        .fetch_one(&**self.connection)
        .await
        .map_err(log_err)
    }

    async fn find_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn latest_conversation(&self) -> Result<Option<Conversation>, StoreError> {
        sqlx::query_as("SELECT * FROM conversations ORDER BY updated_at DESC, rowid DESC LIMIT 1")
            .fetch_optional(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, StoreError> {
        sqlx::query_as(
            "SELECT * FROM conversations ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&**self.connection)
        .await
        .map_err(log_err)
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.connection.begin().await.map_err(log_err)?;

        sqlx::query("DELETE FROM turns WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(log_err)?;

        let deleted = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(log_err)?
            .rows_affected();

        tx.commit().await.map_err(log_err)?;

        Ok(deleted > 0)
    }

    async fn update_title(&self, conversation_id: Uuid, title: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(conversation_id)
            .execute(&**self.connection)
            .await
            .map_err(log_err)?;
        Ok(())
    }

    async fn update_context(
        &self,
        conversation_id: Uuid,
        active_form: Option<&str>,
        document_context: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE conversations SET active_form = COALESCE(?, active_form), document_context = COALESCE(?, document_context) WHERE id = ?",
        )
        .bind(active_form)
        .bind(document_context)
        .bind(conversation_id)
        .execute(&**self.connection)
        .await
        .map_err(log_err)?;
        Ok(())
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(updated_at)
            .bind(conversation_id)
            .execute(&**self.connection)
            .await
            .map_err(log_err)?;
        Ok(())
    }

    async fn insert_turn(&self, turn: Turn) -> Result<Turn, StoreError> {
        let sql = format!(
            "INSERT INTO turns ({TURN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TURN_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(turn.id)
            .bind(turn.conversation_id)
            .bind(turn.role)
            .bind(turn.content)
            .bind(turn.created_at)
            .bind(turn.sources)
            .bind(turn.kind)
            .bind(turn.used_knowledge_base)
            .bind(turn.file_info)
            .fetch_one(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn list_recent_turns(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Turn>, StoreError> {
        let sql = format!(
            "SELECT {TURN_COLUMNS} FROM (SELECT *, rowid AS seq FROM turns WHERE conversation_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?) ORDER BY created_at ASC, seq ASC"
        );
        sqlx::query_as(&sql)
            .bind(conversation_id)
            .bind(i64::from(limit))
            .fetch_all(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn list_turns(&self, conversation_id: Uuid) -> Result<Vec<Turn>, StoreError> {
        let sql = format!(
            "SELECT {TURN_COLUMNS} FROM turns WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC"
        );
        sqlx::query_as(&sql)
            .bind(conversation_id)
            .fetch_all(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn count_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&**self.connection)
            .await
            .map_err(log_err)
    }

    async fn count_user_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE conversation_id = ? AND role = ?")
            .bind(conversation_id)
            .bind(TurnRole::User)
            .fetch_one(&**self.connection)
            .await
            .map_err(log_err)
    }
}
