//! Conversation titles derived from the first user turn.

use regex::Regex;
use std::sync::LazyLock;

pub const DOCUMENT_TITLE: &str = "Document Help";
pub const FALLBACK_TITLE: &str = "New Chat";

/// Keyword → title, first match wins.
const TOPICS: &[(&str, &str)] = &[
    // German bureaucracy
    ("bürgergeld", "Bürgergeld Help"),
    ("arbeitslosengeld", "Unemployment Benefits"),
    ("jobcenter", "Jobcenter Questions"),
    ("sozialamt", "Social Services"),
    ("krankenkasse", "Health Insurance"),
    ("miete", "Housing Costs"),
    ("wohnung", "Housing Help"),
    // forms and applications
    ("antrag", "Application Help"),
    ("formular", "Form Help"),
    ("hauptantrag", "Main Application"),
    ("weiterbewilligung", "Renewal Application"),
    ("wba", "WBA Form"),
    ("vm", "VM Form"),
    ("kdu", "KDU Form"),
    ("ha", "HA Form"),
    ("ek", "EK Form"),
    // communication
    ("email", "Email Writing"),
    ("brief", "Letter Writing"),
    ("schreiben", "Writing Help"),
    ("übersetzen", "Translation"),
    ("translate", "Translation"),
    ("document", "Document Help"),
    ("dokument", "Document Help"),
    // English terms
    ("form", "Form Help"),
    ("application", "Application Help"),
    ("benefits", "Benefits Info"),
    ("eligibility", "Eligibility Check"),
    ("payment", "Payment Info"),
    ("housing", "Housing Help"),
    ("unemployment", "Unemployment Help"),
];

/// Keywords that only match as whole words.
const WHOLE_WORD_TOPICS: &[&str] = &["wba", "vm", "kdu", "ha", "ek", "form"];

const QUESTION_TITLES: &[(&[&str], &str)] = &[
    (&["how much", "wie viel", "wieviel"], "Amount Questions"),
    (&["what is", "was ist"], "Info Request"),
    (&["how to", "wie kann ich", "wie mache ich"], "How-to Guide"),
    (&["when", "wann"], "Timing Questions"),
    (&["where", "wo"], "Location Help"),
    (&["eligible", "berechtigt", "anspruch"], "Eligibility Check"),
    (&["help", "hilfe"], "General Help"),
    (&["explain", "erklären", "erkläre"], "Explanation Request"),
    (&["difference", "unterschied"], "Comparison Help"),
];

struct TitleRule {
    pattern: Regex,
    title: &'static str,
}

fn keyword_pattern(keyword: &str, whole_word: bool) -> String {
    if whole_word {
        format!(r"\b{}\b", regex::escape(keyword))
    } else {
        regex::escape(keyword)
    }
}

static TOPIC_RULES: LazyLock<Vec<TitleRule>> = LazyLock::new(|| {
    TOPICS
        .iter()
        .map(|(keyword, title)| TitleRule {
            pattern: Regex::new(&keyword_pattern(keyword, WHOLE_WORD_TOPICS.contains(keyword)))
                .expect("Invalid topic regex"),
            title,
        })
        .collect()
});

static QUESTION_RULES: LazyLock<Vec<TitleRule>> = LazyLock::new(|| {
    QUESTION_TITLES
        .iter()
        .map(|(phrases, title)| {
            let alts: Vec<String> = phrases.iter().map(|p| keyword_pattern(p, true)).collect();
            TitleRule {
                pattern: Regex::new(&alts.join("|")).expect("Invalid question regex"),
                title,
            }
        })
        .collect()
});

static STOP_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(ich|mir|mich|der|die|das|ein|eine|ist|sind|can|i|the|a|an|is|are|do|does|how|what|when|where|why|help|hilfe|please|bitte)\b",
    )
    .expect("Invalid stop word regex")
});

/// Short, topic-style title for a conversation, based on its first user message.
pub fn generate_title(message: &str) -> String {
    let msg = message.trim().to_lowercase();
    if msg.is_empty() {
        return FALLBACK_TITLE.to_owned();
    }

    if let Some(rule) = TOPIC_RULES
        .iter()
        .chain(QUESTION_RULES.iter())
        .find(|rule| rule.pattern.is_match(&msg))
    {
        return rule.title.to_owned();
    }

    let cleaned = STOP_WORDS_RE.replace_all(&msg, "");
    cleaned
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|word| word.chars().count() > 3)
        .map(|word| format!("{} Help", capitalize(word)))
        .unwrap_or_else(|| FALLBACK_TITLE.to_owned())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_titles() {
        assert_eq!(generate_title("How much Bürgergeld do I get?"), "Bürgergeld Help");
        assert_eq!(generate_title("Termin beim Jobcenter verschoben"), "Jobcenter Questions");
        assert_eq!(
            generate_title("How do I fill out section B of the WBA form?"),
            "WBA Form"
        );
        assert_eq!(generate_title("Write an email please"), "Email Writing");
    }

    #[test]
    fn test_topic_order_is_respected() {
        // "antrag" comes before "hauptantrag" in the table
        assert_eq!(generate_title("Hauptantrag"), "Application Help");
    }

    #[test]
    fn test_short_codes_do_not_match_inside_words() {
        assert_ne!(generate_title("I have a question"), "HA Form");
        assert_eq!(generate_title("My HA is missing"), "HA Form");
    }

    #[test]
    fn test_question_titles() {
        assert_eq!(generate_title("What is a Meldebescheinigung?"), "Info Request");
        assert_eq!(generate_title("When will I be paid?"), "Timing Questions");
        assert_eq!(generate_title("Was ist der Unterschied?"), "Info Request");
    }

    #[test]
    fn test_first_meaningful_word() {
        assert_eq!(generate_title("Kindergeld für Studenten"), "Kindergeld Help");
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(generate_title("   "), FALLBACK_TITLE);
        assert_eq!(generate_title("ok so"), FALLBACK_TITLE);
    }
}
