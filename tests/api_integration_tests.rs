//! API Integration Tests
//!
//! Tests the HTTP API endpoints with a real database. No model API key is
//! configured, so every model call fails fast and turns end in the fallback
//! error message.
//!
//! Tests are serialized because they share a global test pool and environment.
//!
//! Note: The `more-di` DI framework doesn't support injecting custom pools.
//! We work around this by using `DatabaseConnection::set_test_pool()` to set
//! a global pool that the DI-created DatabaseConnection will use.

use amtly_api::api;
use amtly_api::config::Settings;
use amtly_api::core::assistant::OpenAiAssistant;
use amtly_api::core::orchestrator::TurnOrchestrator;
use amtly_api::core::services::StoredConversationService;
use amtly_api::infrastructure::database::DatabaseConnection;
use amtly_api::infrastructure::extraction::FileTextExtractor;
use amtly_api::infrastructure::knowledge::EmbeddingKnowledgeBase;
use amtly_api::infrastructure::repositories::DbConversationRepository;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use serde_json::{Value, json};
use serial_test::serial;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use tower::ServiceExt;
use uuid::Uuid;

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

const BOUNDARY: &str = "amtly-test-boundary";

/// Setup test database with migrations and returns pool
/// Uses in-memory SQLite for test isolation
async fn setup_test_db() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    // Use file URI format with shared cache - each test gets a unique DB
    let db_url = format!("sqlite:file:testdb{}?mode=memory&cache=shared", db_num);

    let pool = SqlitePool::connect(&db_url).await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    // Set this pool as the global test pool so DI uses it
    DatabaseConnection::set_test_pool(pool.clone());

    // SAFETY: tests touching the environment are serialized
    unsafe {
        std::env::set_var("OPENAI_API_KEY", "");
        std::env::set_var("KNOWLEDGE_BASE_DIR", "target/amtly-test-no-knowledge");
    }

    pool
}

/// Clean up after test
fn cleanup_test_db() {
    DatabaseConnection::clear_test_pool();
}

/// Create test app - uses the global test pool set by setup_test_db()
fn create_test_app() -> axum::Router {
    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(DbConversationRepository::singleton())
        .add(StoredConversationService::singleton())
        .add(OpenAiAssistant::singleton())
        .add(EmbeddingKnowledgeBase::singleton())
        .add(FileTextExtractor::singleton())
        .add(TurnOrchestrator::singleton())
        .build_provider()
        .unwrap();

    api::router(16 * 1024 * 1024).with_provider(provider)
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
#[serial]
async fn test_health_reports_configuration() {
    let _pool = setup_test_db().await;

    let response = create_test_app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_configured"], false);
    assert_eq!(json["knowledge_base_dir"], "target/amtly-test-no-knowledge");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_list_conversations_empty() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(get("/api/conversations"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["conversations"].as_array().unwrap().len(), 0);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_create_and_list_conversation() {
    let _pool = setup_test_db().await;
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/conversations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "title": "Widerspruch" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["title"], "Widerspruch");

    let response = app.oneshot(get("/api/conversations")).await.unwrap();
    let json = json_body(response).await;
    let conversations = json["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["id"], created["id"]);
    assert_eq!(conversations[0]["turn_count"], 0);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_get_nonexistent_conversation() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(get(&format!("/api/conversations/{}", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "not_found");
    assert_eq!(json["type"], "error");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_delete_conversation() {
    let pool = setup_test_db().await;
    let app = create_test_app();

    let conversation_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(conversation_id)
    .bind("New Chat")
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/conversations/{conversation_id}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_without_model_key_persists_fallback_turn() {
    let _pool = setup_test_db().await;
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(multipart_request(&[Part::Text(
            "message",
            "What documents do I need for the application?",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["type"], "chat");
    assert!(json["response"].as_str().unwrap().starts_with("❌"));
    assert!(json.get("document_text").is_none());

    let conversation_id = json["conversation_id"].as_str().unwrap().to_owned();
    let response = app
        .oneshot(get(&format!("/api/conversations/{conversation_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let turns = json["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["role"], "assistant");
    assert_eq!(json["title"], "Document Help");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_rejects_empty_request() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(multipart_request(&[Part::Text("message", "   ")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "validation_error");
    assert_eq!(json["error"], "Please provide a message or upload a file.");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_rejects_disallowed_file_type() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(multipart_request(&[Part::File("notes.docx", b"PK")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "file_validation");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_image_without_ocr_reports_no_text() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(multipart_request(&[Part::File("scan.png", &[0x89, b'P', b'N', b'G'])]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["type"], "document");
    assert_eq!(json["sources"].as_array().unwrap().len(), 0);
    assert!(
        json["response"]
            .as_str()
            .unwrap()
            .contains("couldn't extract readable text")
    );

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_unknown_conversation_is_not_found() {
    let _pool = setup_test_db().await;
    let missing = Uuid::new_v4().to_string();

    let response = create_test_app()
        .oneshot(multipart_request(&[
            Part::Text("message", "Hallo"),
            Part::Text("conversation_id", &missing),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error_code"], "not_found");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_errors_use_message_language() {
    let _pool = setup_test_db().await;
    let missing = Uuid::new_v4().to_string();

    let response = create_test_app()
        .oneshot(multipart_request(&[
            Part::Text("message", "How much Bürgergeld do I get?"),
            Part::Text("conversation_id", &missing),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Unterhaltung nicht gefunden.");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_truncated_upload_is_file_processing_error() {
    let _pool = setup_test_db().await;

    // the file part never reaches its closing boundary
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"bescheid.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "file_processing");
    assert_eq!(json["error"], "The file could not be processed.");

    cleanup_test_db();
}
