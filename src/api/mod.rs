use axum::Router;
use axum::extract::DefaultBodyLimit;

pub mod chat;
pub mod conversations;
pub mod error;
pub mod health;

/// Multipart overhead allowed on top of the uploads themselves.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// All HTTP routes. `max_upload_size` bounds the whole request body.
pub fn router(max_upload_size: u64) -> Router {
    let body_limit = usize::try_from(max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .nest("/chat", chat::router())
        .nest("/api/conversations", conversations::router())
        .nest("/health", health::router())
        .layer(DefaultBodyLimit::max(body_limit))
}
