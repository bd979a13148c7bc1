//! DI "Interfaces"

use crate::core::error::{ExtractionError, KnowledgeError, ModelError, StoreError};
use crate::infrastructure::entities::{Conversation, FileInfo, Turn, TurnKind, TurnRole};
use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

/// A stateless language-model call: one system prompt, one user message.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, user_text: &str, system_prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSnippet {
    pub content: String,
    /// File name of the indexed document the snippet was taken from.
    pub source_label: String,
    pub score: f32,
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Top `k` snippets for `query`, best match first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, KnowledgeError>;
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract_text(&self, file: &UploadedFile) -> Result<String, ExtractionError>;
}

/// A turn about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub role: TurnRole,
    pub content: String,
    pub kind: TurnKind,
    pub sources: Vec<String>,
    /// True exactly when the turn cites sources.
    pub used_knowledge_base: bool,
    pub file_info: Option<FileInfo>,
}

impl NewTurn {
    pub fn user(content: impl Into<String>, file_info: Option<FileInfo>) -> Self {
        NewTurn {
            role: TurnRole::User,
            content: content.into(),
            kind: TurnKind::Chat,
            sources: Vec::new(),
            used_knowledge_base: false,
            file_info,
        }
    }

    pub fn assistant(content: impl Into<String>, kind: TurnKind, sources: Vec<String>) -> Self {
        NewTurn {
            role: TurnRole::Assistant,
            content: content.into(),
            kind,
            used_knowledge_base: !sources.is_empty(),
            sources,
            file_info: None,
        }
    }
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Creates a new conversation, titled "New Chat" unless a title is given.
    async fn create_conversation(&self, title: Option<String>)
    -> Result<Conversation, StoreError>;

    /// Returns `Err(ConversationNotFound)` if the conversation does not exist.
    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, StoreError>;

    /// The most recently updated conversation, created if there is none.
    async fn get_or_create_default(&self) -> Result<Conversation, StoreError>;

    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, StoreError>;

    /// Returns `Err(ConversationNotFound)` if the conversation did not exist.
    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), StoreError>;

    /// Appends a turn and bumps the conversation's update time.
    ///
    /// The first user turn of a conversation also sets its title.
    async fn append_turn(&self, conversation_id: Uuid, turn: NewTurn) -> Result<Turn, StoreError>;

    /// The last `limit` turns in chronological order.
    async fn recent_turns(&self, conversation_id: Uuid, limit: u32)
    -> Result<Vec<Turn>, StoreError>;

    async fn list_turns(&self, conversation_id: Uuid) -> Result<Vec<Turn>, StoreError>;

    async fn count_turns(&self, conversation_id: Uuid) -> Result<i64, StoreError>;

    /// Overwrites the stored document context.
    async fn update_document_context(
        &self,
        conversation_id: Uuid,
        document_context: &str,
    ) -> Result<(), StoreError>;
}
