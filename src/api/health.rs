use crate::config::Settings;
use axum::Json;
use axum::routing::get;
use axum::Router;
use di_axum::Inject;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_configured: bool,
    pub knowledge_base_dir: String,
}

pub fn router() -> Router {
    Router::new().route("/", get(health))
}

async fn health(Inject(settings): Inject<Settings>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        model_configured: settings.model_configured(),
        knowledge_base_dir: settings.knowledge_base_dir.display().to_string(),
    })
}
