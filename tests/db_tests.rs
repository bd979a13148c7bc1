//! Database and repository tests
//!
//! Tests SQLite migrations, entity storage, and schema constraints

use amtly_api::infrastructure::database::DatabaseConnection;
use amtly_api::infrastructure::entities::{
    Conversation, DEFAULT_TITLE, FileInfo, Turn, TurnKind, TurnRole,
};
use amtly_api::infrastructure::repositories::DbConversationRepository;
use amtly_api::infrastructure::traits::ConversationRepository;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

/// Setup test database with migrations.
/// A single connection keeps every query on the same in-memory database.
async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

fn repository(pool: &SqlitePool) -> DbConversationRepository {
    DbConversationRepository::new(Arc::new(DatabaseConnection::from_pool(pool.clone())))
}

fn turn(conversation_id: Uuid, role: TurnRole, content: &str) -> Turn {
    Turn {
        id: Uuid::new_v4(),
        conversation_id,
        role,
        content: content.to_owned(),
        created_at: Utc::now(),
        sources: Json(Vec::new()),
        kind: TurnKind::Chat,
        used_knowledge_base: false,
        file_info: None,
    }
}

#[tokio::test]
async fn test_database_migrations_work() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
    let tables: Vec<String> = tables.into_iter().map(|(name,)| name).collect();

    assert!(tables.contains(&"conversations".to_owned()));
    assert!(tables.contains(&"turns".to_owned()));
}

#[tokio::test]
async fn test_conversation_roundtrip() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);

    let created = repo
        .create_conversation(Conversation::new(None))
        .await
        .unwrap();
    let found = repo.find_conversation(created.id).await.unwrap().unwrap();

    assert_eq!(found.id, created.id);
    assert_eq!(found.title, DEFAULT_TITLE);
    assert!(found.document_context.is_none());
    assert!(repo.find_conversation(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_turn_enums_and_json_columns() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);
    let conversation = repo
        .create_conversation(Conversation::new(Some("Bescheid".to_owned())))
        .await
        .unwrap();

    let mut user = turn(conversation.id, TurnRole::User, "");
    user.file_info = Some(Json(FileInfo {
        count: 1,
        filenames: vec!["bescheid.pdf".to_owned()],
        total_size: 2048,
    }));
    repo.insert_turn(user).await.unwrap();

    let mut assistant = turn(conversation.id, TurnRole::Assistant, "📄 Analyse");
    assistant.kind = TurnKind::Document;
    assistant.sources = Json(vec!["bescheid.pdf".to_owned()]);
    repo.insert_turn(assistant).await.unwrap();

    let turns = repo.list_turns(conversation.id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[0].file_info.as_ref().unwrap().0.total_size, 2048);
    assert_eq!(turns[1].kind, TurnKind::Document);
    assert_eq!(turns[1].sources.0, vec!["bescheid.pdf".to_owned()]);

    // enums are stored as their integer discriminants
    let raw: Vec<(i64, i64)> =
        sqlx::query_as("SELECT role, kind FROM turns WHERE conversation_id = ? ORDER BY rowid")
            .bind(conversation.id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(raw, vec![(1, 1), (2, 2)]);

    assert_eq!(repo.count_turns(conversation.id).await.unwrap(), 2);
    assert_eq!(repo.count_user_turns(conversation.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_recent_turns_are_chronological() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);
    let conversation = repo
        .create_conversation(Conversation::new(None))
        .await
        .unwrap();

    for i in 0..10 {
        let role = if i % 2 == 0 {
            TurnRole::User
        } else {
            TurnRole::Assistant
        };
        repo.insert_turn(turn(conversation.id, role, &format!("turn {i}")))
            .await
            .unwrap();
    }

    let recent = repo.list_recent_turns(conversation.id, 4).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["turn 6", "turn 7", "turn 8", "turn 9"]);
}

#[tokio::test]
async fn test_list_orders_by_last_update() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);

    let older = repo
        .create_conversation(Conversation::new(Some("Older".to_owned())))
        .await
        .unwrap();
    let newer = repo
        .create_conversation(Conversation::new(Some("Newer".to_owned())))
        .await
        .unwrap();

    repo.touch_conversation(older.id, Utc::now() + Duration::minutes(5))
        .await
        .unwrap();

    let listed = repo.list_conversations(10).await.unwrap();
    assert_eq!(listed[0].id, older.id);
    assert_eq!(listed[1].id, newer.id);
    assert_eq!(repo.latest_conversation().await.unwrap().unwrap().id, older.id);
    assert_eq!(repo.list_conversations(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_title_and_context() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);
    let conversation = repo
        .create_conversation(Conversation::new(None))
        .await
        .unwrap();

    repo.update_title(conversation.id, "Bürgergeld Help")
        .await
        .unwrap();
    repo.update_context(conversation.id, Some("WBA"), Some("Bewilligungsbescheid"))
        .await
        .unwrap();

    let found = repo.find_conversation(conversation.id).await.unwrap().unwrap();
    assert_eq!(found.title, "Bürgergeld Help");
    assert_eq!(found.active_form.as_deref(), Some("WBA"));
    assert_eq!(found.document_context.as_deref(), Some("Bewilligungsbescheid"));
}

#[tokio::test]
async fn test_delete_removes_turns() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);
    let conversation = repo
        .create_conversation(Conversation::new(None))
        .await
        .unwrap();
    repo.insert_turn(turn(conversation.id, TurnRole::User, "Hallo"))
        .await
        .unwrap();

    assert!(repo.delete_conversation(conversation.id).await.unwrap());
    assert!(!repo.delete_conversation(conversation.id).await.unwrap());

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns WHERE conversation_id = ?")
        .bind(conversation.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn test_conversation_cascade_delete() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);
    let conversation = repo
        .create_conversation(Conversation::new(None))
        .await
        .unwrap();
    repo.insert_turn(turn(conversation.id, TurnRole::User, "Test"))
        .await
        .unwrap();

    // Delete conversation directly (should cascade to turns)
    sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(conversation.id)
        .execute(&pool)
        .await
        .unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns WHERE conversation_id = ?")
        .bind(conversation.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn test_turn_requires_existing_conversation() {
    let pool = setup_test_db().await;
    let repo = repository(&pool);

    let result = repo
        .insert_turn(turn(Uuid::new_v4(), TurnRole::User, "orphan"))
        .await;
    assert!(result.is_err());
}
