pub mod assistant;
pub mod context;
pub mod error;
pub mod formatter;
pub mod handlers;
pub mod language;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod services;
pub mod title;
pub mod traits;
pub mod validation;
