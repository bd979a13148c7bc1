//! Runtime settings, read from the environment (and `.env`).
//!

use crate::core::language::Language;
use di::{inject, injectable};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_address: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model_timeout: Duration,
    pub knowledge_base_dir: PathBuf,
    pub retrieval_top_k: usize,
    pub default_language: Language,
    pub max_file_size: u64,
}

#[injectable]
impl Settings {
    #[inject]
    pub fn load() -> Settings {
        Settings::from_env()
    }
}

impl Settings {
    pub fn from_env() -> Settings {
        dotenvy::dotenv().ok();

        Settings {
            database_url: var_or("DATABASE_URL", "sqlite://amtly.db?mode=rwc"),
            bind_address: var_or("BIND_ADDRESS", "0.0.0.0:3000"),
            openai_api_key: var_or("OPENAI_API_KEY", ""),
            openai_base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_owned(),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            embedding_model: var_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            max_tokens: parsed_or("MAX_TOKENS", 1000),
            temperature: parsed_or("TEMPERATURE", 0.3),
            model_timeout: Duration::from_secs(parsed_or("MODEL_TIMEOUT_SECS", 60)),
            knowledge_base_dir: PathBuf::from(var_or("KNOWLEDGE_BASE_DIR", "knowledge_base")),
            retrieval_top_k: parsed_or("RETRIEVAL_TOP_K", 3),
            default_language: env::var("DEFAULT_LANGUAGE")
                .ok()
                .and_then(|code| Language::from_code(&code))
                .unwrap_or(Language::English),
            max_file_size: parsed_or("MAX_FILE_SIZE", 16 * 1024 * 1024),
        }
    }

    pub fn model_configured(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite::memory:".to_owned(),
            bind_address: "127.0.0.1:3000".to_owned(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            openai_model: "gpt-4o-mini".to_owned(),
            embedding_model: "text-embedding-3-small".to_owned(),
            max_tokens: 1000,
            temperature: 0.3,
            model_timeout: Duration::from_secs(60),
            knowledge_base_dir: PathBuf::from("knowledge_base"),
            retrieval_top_k: 3,
            default_language: Language::English,
            max_file_size: 16 * 1024 * 1024,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| T::from_str(s.trim()).ok())
        .unwrap_or(default)
}
