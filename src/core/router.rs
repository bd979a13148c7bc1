//! Rule-based routing of a text turn to one handling strategy.
//!
//! Rules are evaluated in order and the first match wins:
//! form question → institution email → general retrieval.

use crate::core::language::is_institution_request;
use crate::infrastructure::entities::Turn;
use regex::Regex;
use serde::Serialize;
use std::fmt::Display;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Form,
    InstitutionEmail,
    General,
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Route::Form => "form",
            Route::InstitutionEmail => "institution_email",
            Route::General => "general",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub route: Route,
    pub text: String,
}

// =============================================================================
// Form question detection
// =============================================================================

/// Informational phrasings that never count as form-filling help.
const GENERAL_QUESTION_PATTERNS: &[&str] = &[
    // amounts
    "how much",
    "wie viel",
    "wieviel",
    "how many",
    "wie viele",
    "what is the amount",
    "was ist der betrag",
    "what amount",
    "welcher betrag",
    // definitions
    "what is",
    "was ist",
    "what are",
    "was sind",
    "define",
    "definiere",
    "definition",
    // explanations
    "explain",
    "erklär",
    "tell me about",
    "erzähle mir über",
    "erzähl mir",
    "information about",
    "informationen über",
    // eligibility
    "am i eligible",
    "bin ich berechtigt",
    "habe ich anspruch",
    "do i qualify",
    "qualifiziere ich mich",
    "can i get",
    "kann ich bekommen",
    "bekomme ich",
    "entitled to",
    "berechtigt zu",
    // timing
    "when do i get",
    "wann bekomme ich",
    "wann erhalte ich",
    "when is",
    "wann ist",
    "when does",
    "wann macht",
    "how long",
    "wie lange",
    // process
    "how does",
    "wie funktioniert",
    "wie läuft",
    "what happen",
    "was passiert",
    "was geschieht",
    "what is the process",
    "wie ist der prozess",
];

/// Abbreviations and names of specific Jobcenter forms.
const FORM_CODES: &[&str] = &["wba", "ha", "vm", "kdu", "ek", "wep", "uf"];
const FORM_NAMES: &[&str] = &["hauptantrag", "weiterbewilligung"];

const FORM_ACTION_PATTERNS: &[&str] = &[
    // filling out
    "fill out",
    "ausfüllen",
    "fill in",
    "eintragen",
    "how to fill",
    "wie ausfüllen",
    "wie fülle ich",
    "complete the form",
    "formular vervollständigen",
    "vervollständigen",
    "how to complete",
    // help requests
    "help with form",
    "hilfe bei formular",
    "hilfe beim formular",
    "help me with",
    "hilf mir bei",
    "hilf mir mit",
    // fields
    "what does this field",
    "was bedeutet dieses feld",
    "field means",
    "feld bedeutet",
    "where do i write",
    "wo schreibe ich",
    "wo trage ich ein",
    "what do i put in",
    "was trage ich ein",
    "was schreibe ich",
    "which box",
    "welches feld",
    "welche zeile",
    // sections
    "section",
    "abschnitt",
    "teil",
    "bereich",
    "field",
    "feld",
    "zeile",
    "box",
];

const FORM_WORDS: &[&str] = &["form", "formular", "formulär", "antrag", "application"];

fn phrase_regex(phrases: &[&str]) -> Regex {
    let alts: Vec<String> = phrases
        .iter()
        .map(|p| format!(r"\b{}", regex::escape(p)))
        .collect();
    Regex::new(&format!("(?i)(?:{})", alts.join("|"))).expect("Invalid routing regex")
}

struct FormPatterns {
    general_question: Regex,
    form_code: Regex,
    form_action: Regex,
    form_word: Regex,
}

static FORM_PATTERNS: LazyLock<FormPatterns> = LazyLock::new(|| FormPatterns {
    general_question: phrase_regex(GENERAL_QUESTION_PATTERNS),
    form_code: {
        let codes: Vec<String> = FORM_CODES.iter().map(|c| regex::escape(c)).collect();
        let names: Vec<String> = FORM_NAMES.iter().map(|n| regex::escape(n)).collect();
        // short codes must stand alone ("ha" is not "have"), names may be compounded
        Regex::new(&format!(
            r"(?i)\b(?:{})\b|(?:{})",
            codes.join("|"),
            names.join("|")
        ))
        .expect("Invalid form code regex")
    },
    form_action: phrase_regex(FORM_ACTION_PATTERNS),
    form_word: phrase_regex(FORM_WORDS),
});

/// Outcome of the two-stage form question check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormCheck {
    RejectedAsGeneralQuestion,
    FormCode,
    FormAction,
    FormWordWithAction,
    NotAForm,
}

impl FormCheck {
    pub fn is_form_question(&self) -> bool {
        matches!(
            self,
            FormCheck::FormCode | FormCheck::FormAction | FormCheck::FormWordWithAction
        )
    }
}

pub fn check_form_question(text: &str) -> FormCheck {
    let text = text.trim();
    if text.is_empty() {
        return FormCheck::NotAForm;
    }

    let patterns = &*FORM_PATTERNS;
    if patterns.general_question.is_match(text) {
        return FormCheck::RejectedAsGeneralQuestion;
    }
    if patterns.form_code.is_match(text) {
        return FormCheck::FormCode;
    }

    let has_action = patterns.form_action.is_match(text);
    if has_action && patterns.form_word.is_match(text) {
        FormCheck::FormWordWithAction
    } else if has_action {
        FormCheck::FormAction
    } else {
        FormCheck::NotAForm
    }
}

pub fn is_form_question(text: &str) -> bool {
    check_form_question(text).is_form_question()
}

// =============================================================================
// Router
// =============================================================================

struct RouteRule {
    route: Route,
    matches: fn(&str) -> bool,
}

static ROUTE_RULES: [RouteRule; 2] = [
    RouteRule {
        route: Route::Form,
        matches: is_form_question,
    },
    RouteRule {
        route: Route::InstitutionEmail,
        matches: is_institution_request,
    },
];

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        MessageRouter
    }

    /// Picks the handling strategy for one text turn.
    ///
    /// History is accepted for follow-up aware routing but the current rules
    /// decide on the text alone.
    pub fn route(&self, text: &str, _history: &[Turn]) -> RoutingDecision {
        let route = ROUTE_RULES
            .iter()
            .find(|rule| (rule.matches)(text))
            .map(|rule| rule.route)
            .unwrap_or(Route::General);

        RoutingDecision {
            route,
            text: text.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(text: &str) -> Route {
        MessageRouter::new().route(text, &[]).route
    }

    #[test]
    fn test_amount_question_is_general() {
        assert_eq!(route("How much Bürgergeld do I get?"), Route::General);
    }

    #[test]
    fn test_general_question_beats_form_code() {
        assert_eq!(
            check_form_question("What is the WBA form?"),
            FormCheck::RejectedAsGeneralQuestion
        );
        assert_eq!(route("Wie lange dauert die Bearbeitung vom HA?"), Route::General);
        assert_eq!(route("Can you explain section 3 of the KDU?"), Route::General);
    }

    #[test]
    fn test_form_code_routes_to_form() {
        assert_eq!(
            route("How do I fill out section B of the WBA form?"),
            Route::Form
        );
        assert_eq!(check_form_question("Ich brauche den Hauptantrag"), FormCheck::FormCode);
    }

    #[test]
    fn test_short_codes_need_word_boundaries() {
        // "ha" inside "have", "ek" inside "week"
        assert_eq!(check_form_question("I have a question this week"), FormCheck::NotAForm);
    }

    #[test]
    fn test_form_action_routes_to_form() {
        assert_eq!(
            check_form_question("Where do I write my bank details?"),
            FormCheck::FormAction
        );
        assert_eq!(
            check_form_question("Wie fülle ich das Formular aus?"),
            FormCheck::FormWordWithAction
        );
    }

    #[test]
    fn test_form_word_alone_is_not_enough() {
        assert_eq!(
            check_form_question("I sent my application yesterday"),
            FormCheck::NotAForm
        );
    }

    #[test]
    fn test_institution_email_route() {
        assert_eq!(
            route("Write an email to Jobcenter about my appointment"),
            Route::InstitutionEmail
        );
        assert_eq!(
            route("Schreib einen Brief an die Familienkasse"),
            Route::InstitutionEmail
        );
    }

    #[test]
    fn test_form_beats_institution_email() {
        assert_eq!(
            route("Help me with the field for my email address in the Jobcenter form"),
            Route::Form
        );
    }

    #[test]
    fn test_everything_else_is_general() {
        assert_eq!(route("Hello there"), Route::General);
        assert_eq!(route(""), Route::General);
    }

    #[test]
    fn test_decision_carries_text() {
        let decision = MessageRouter::new().route("Hallo", &[]);
        assert_eq!(decision.text, "Hallo");
        assert_eq!(decision.route.to_string(), "general");
    }
}
