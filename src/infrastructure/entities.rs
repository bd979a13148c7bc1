//! Database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active_form: Option<String>,
    /// Text of the most recent successful upload, truncated.
    pub document_context: Option<String>,
}

impl Conversation {
    pub fn new(title: Option<String>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
            created_at: now,
            updated_at: now,
            active_form: None,
            document_context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum TurnRole {
    User = 1,
    Assistant = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum TurnKind {
    Chat = 1,
    Document = 2,
    Form = 3,
}

impl TurnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnKind::Chat => "chat",
            TurnKind::Document => "document",
            TurnKind::Form => "form",
        }
    }
}

/// Metadata of the files attached to a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub count: usize,
    pub filenames: Vec<String>,
    pub total_size: u64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sources: Json<Vec<String>>,
    pub kind: TurnKind,
    pub used_knowledge_base: bool,
    pub file_info: Option<Json<FileInfo>>,
}
