//! User-facing response formatting.

use crate::infrastructure::entities::TurnKind;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("Invalid blank line regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("Invalid space regex"));

#[derive(Debug, Clone, Serialize)]
pub struct FormattedResponse {
    pub response: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

fn kind_prefix(kind: TurnKind) -> Option<&'static str> {
    match kind {
        TurnKind::Chat => None,
        TurnKind::Document => Some("📄 "),
        TurnKind::Form => Some("📝 "),
    }
}

pub fn clean_response_text(text: &str) -> String {
    let text = BLANK_LINES_RE.replace_all(text, "\n\n");
    SPACES_RE.replace_all(&text, " ").trim().to_owned()
}

pub fn format_chat_response(content: &str, sources: &[String], kind: TurnKind) -> FormattedResponse {
    let mut formatted = clean_response_text(content);

    // document turns already announce their files in the analysis text
    if !sources.is_empty() && kind != TurnKind::Document {
        formatted.push_str(&format!("\n\n📖 **Sources:** {}", sources.join(", ")));
    }

    if let Some(prefix) = kind_prefix(kind) {
        let emoji = prefix.trim_end();
        if !formatted.starts_with(emoji) {
            formatted.insert_str(0, prefix);
        }
    }

    FormattedResponse {
        length: formatted.chars().count(),
        response: formatted,
        kind: kind.as_str(),
        sources: sources.to_vec(),
        timestamp: Utc::now(),
    }
}

pub fn format_error_response(message: impl Into<String>, error_code: &'static str) -> ErrorBody {
    ErrorBody {
        error: message.into(),
        error_code,
        timestamp: Utc::now(),
        kind: "error",
    }
}
