//! Context assembly for model grounding.
//!
//! Builds one text block from up to three optional sections, always in this order:
//!
//! 1. **Recent conversation** - the last few turns, each truncated
//! 2. **Official documents** - retrieved knowledge snippets
//! 3. **Uploaded document** - the conversation's document context
//!
//! Sections without material are omitted together with their header.

use crate::core::traits::KnowledgeSnippet;
use crate::infrastructure::entities::{Turn, TurnRole};

pub const HISTORY_HEADER: &str = "=== RECENT CONVERSATION ===";
pub const KNOWLEDGE_HEADER: &str = "=== OFFICIAL DOCUMENTS ===";
pub const DOCUMENT_HEADER: &str = "=== UPLOADED DOCUMENT ===";

/// Turns fetched from the store per request.
pub const HISTORY_FETCH_LIMIT: u32 = 8;
/// Turns of the fetched history that make it into a prompt.
pub const HISTORY_WINDOW: usize = 4;
pub const HISTORY_TURN_CHARS: usize = 150;
/// Per-turn cap used by the fallback prompt.
pub const FALLBACK_TURN_CHARS: usize = 100;
pub const DOCUMENT_CONTEXT_CHARS: usize = 4000;

/// Retrieved snippets merged into one grounding block.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSummary {
    pub text: String,
    /// Normalized, deduplicated labels in retrieval order.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<String>,
    pub has_history: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    pub history_window: usize,
    pub history_turn_chars: usize,
    pub document_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        ContextAssembler {
            history_window: HISTORY_WINDOW,
            history_turn_chars: HISTORY_TURN_CHARS,
            document_chars: DOCUMENT_CONTEXT_CHARS,
        }
    }
}

impl ContextAssembler {
    pub fn assemble(
        &self,
        history: &[Turn],
        knowledge: &[KnowledgeSnippet],
        document: Option<&str>,
    ) -> AssembledContext {
        let mut sections: Vec<String> = Vec::with_capacity(6);
        let mut sources = Vec::new();

        let history_text = format_history(history, self.history_window, self.history_turn_chars);
        let has_history = history_text.is_some();
        if let Some(history_text) = history_text {
            sections.push(HISTORY_HEADER.to_owned());
            sections.push(history_text);
        }

        if let Some(summary) = summarize_knowledge(knowledge) {
            sections.push(KNOWLEDGE_HEADER.to_owned());
            sections.push(summary.text);
            sources = summary.sources;
        }

        if let Some(document) = document.map(str::trim).filter(|d| !d.is_empty()) {
            sections.push(DOCUMENT_HEADER.to_owned());
            sections.push(take_chars(document, self.document_chars));
        }

        AssembledContext {
            text: sections.join("\n\n"),
            sources,
            has_history,
        }
    }
}

/// Renders the last `window` non-empty turns as `Role: content` lines.
pub fn format_history(history: &[Turn], window: usize, max_chars: usize) -> Option<String> {
    let turns: Vec<&Turn> = history
        .iter()
        .filter(|turn| !turn.content.trim().is_empty())
        .collect();
    if turns.is_empty() || window == 0 {
        return None;
    }

    let lines: Vec<String> = turns[turns.len().saturating_sub(window)..]
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            format!("{role}: {}", truncate_with_ellipsis(&turn.content, max_chars))
        })
        .collect();

    Some(lines.join("\n"))
}

pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", take_chars(text, max_chars))
    } else {
        text.to_owned()
    }
}

pub fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Strips document suffixes and rejects placeholder labels.
pub fn normalize_source_label(label: &str) -> Option<String> {
    let cleaned = label.replace(".pdf", "").replace(".txt", "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty()
        || cleaned == "*"
        || cleaned == "unknown"
        || cleaned.chars().count() <= 1
    {
        None
    } else {
        Some(cleaned.to_owned())
    }
}

pub fn summarize_knowledge(snippets: &[KnowledgeSnippet]) -> Option<KnowledgeSummary> {
    if snippets.is_empty() {
        return None;
    }

    let text = snippets
        .iter()
        .map(|snippet| snippet.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut sources: Vec<String> = Vec::new();
    for label in snippets
        .iter()
        .filter_map(|snippet| normalize_source_label(&snippet.source_label))
    {
        if !sources.contains(&label) {
            sources.push(label);
        }
    }

    Some(KnowledgeSummary { text, sources })
}
