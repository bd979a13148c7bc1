//! LLM Assistant service.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint. Every call is
//! stateless: one system message, one user message.

use crate::config::Settings;
use crate::core::error::ModelError;
use crate::core::traits::ModelClient;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Phrases that mark trailing boilerplate when little content follows them.
const ARTIFACTS: &[&str] = &[
    "of course! in order to provide",
    "could you please specify",
    "feel free to provide me with",
    "i can assist you more effectively",
    "---",
    "is there anything else",
    "how can i help you",
];

/// Content after an artifact below this many characters is dropped with it.
const ARTIFACT_TAIL_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.trim().to_owned(),
        }
    }

    pub fn user(content: &str) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.trim().to_owned(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

pub struct OpenAiAssistant {
    client: Client,
    settings: Ref<Settings>,
}

#[injectable(ModelClient)]
impl OpenAiAssistant {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> OpenAiAssistant {
        OpenAiAssistant {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiAssistant {
    async fn complete(&self, user_text: &str, system_prompt: &str) -> Result<String, ModelError> {
        if !self.settings.model_configured() {
            return Err(ModelError::MissingApiKey);
        }

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(user_text));

        let body = CompletionRequest {
            model: &self.settings.openai_model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.settings.openai_base_url))
            .bearer_auth(&self.settings.openai_api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, message });
        }

        let data: CompletionResponse = resp.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let cleaned = clean_response_content(&content);
        debug!(
            "Completion received: {} chars ({} after cleanup)",
            content.len(),
            cleaned.len()
        );

        if cleaned.is_empty() {
            Err(ModelError::EmptyCompletion)
        } else {
            Ok(cleaned)
        }
    }
}

/// Strips trailing assistant boilerplate from a completion.
pub fn clean_response_content(content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let mut cleaned: Vec<&str> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        let lower = line.to_lowercase();

        if ARTIFACTS.iter().any(|artifact| lower.contains(artifact)) {
            let remaining = lines[i + 1..].join("\n");
            if remaining.trim().chars().count() < ARTIFACT_TAIL_CHARS {
                break;
            }
        }

        cleaned.push(line);
    }

    cleaned.join("\n").trim().to_owned()
}
