//! Language and intent classification.
//!
//! Language is resolved by an ordered rule chain: explicit indicators first,
//! then statistical detection for long enough texts, then keyword ratios.
//! Intent (explain / translate) is detected independently.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::LazyLock;

/// Cleaned texts shorter than this skip statistical detection.
pub const MIN_STATISTICAL_CHARS: usize = 20;

/// Statistical verdicts on texts longer than this are `High` confidence.
pub const HIGH_CONFIDENCE_CHARS: usize = 50;

/// A German or English bureaucracy term weighs this much more than a common word.
const DOMAIN_TERM_WEIGHT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "de")]
    German,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub const SUPPORTED: [Language; 2] = [Language::German, Language::English];

    pub fn code(&self) -> &'static str {
        match self {
            Language::German => "de",
            Language::English => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        Language::SUPPORTED
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionReason {
    ExplicitIndicator,
    KeywordDetection,
    StatisticalDetection,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageVerdict {
    pub language: Language,
    pub confidence: Confidence,
    pub reason: DetectionReason,
}

impl LanguageVerdict {
    fn fallback(language: Language) -> Self {
        LanguageVerdict {
            language,
            confidence: Confidence::Low,
            reason: DetectionReason::Fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub wants_explanation: bool,
    pub wants_translation: bool,
}

impl Default for Intent {
    fn default() -> Self {
        Intent {
            wants_explanation: true,
            wants_translation: false,
        }
    }
}

/// Everything the classifier knows about one user text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: LanguageVerdict,
    pub intent: Intent,
    pub institution_email: bool,
}

impl Classification {
    /// Language the assistant should answer in.
    pub fn response_language(&self) -> Language {
        if self.institution_email {
            Language::German
        } else {
            self.verdict.language
        }
    }
}

/// Statistical language identification. Returns an ISO 639-1 code when the
/// language is supported, another code when not, or `None` when undecided.
pub trait StatisticalDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Trigram-based detection backed by `whatlang`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl StatisticalDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code = match info.lang() {
            whatlang::Lang::Deu => "de",
            whatlang::Lang::Eng => "en",
            other => other.code(),
        };
        Some(code.to_owned())
    }
}

// =============================================================================
// Vocabulary
// =============================================================================

const GERMAN_INSTITUTIONS: &[&str] = &[
    "jobcenter",
    "arbeitsagentur",
    "agentur für arbeit",
    "bundesagentur",
    "sozialamt",
    "bürgeramt",
    "amt",
    "behörde",
    "krankenkasse",
    "finanzamt",
    "ausländerbehörde",
    "einwohnermeldeamt",
    "jugendamt",
    "familienkasse",
    "rentenversicherung",
    "berufsgenossenschaft",
    "arbeitsamt",
];

const COMMUNICATION_WORDS: &[&str] = &[
    "email",
    "e-mail",
    "brief",
    "letter",
    "anschreiben",
    "schreiben",
    "nachricht",
    "message",
    "write",
    "schreib",
];

const SWITCH_TO_ENGLISH: &[&str] = &["in english", "auf englisch", "translate to english"];
const SWITCH_TO_GERMAN: &[&str] = &["auf deutsch", "in german", "translate to german"];

const EXPLANATION_WORDS: &[&str] = &[
    "explain", "erkläre", "erklären", "analyse", "analyze", "what is", "was ist", "tell me",
    "sag mir", "describe", "beschreib",
];

const TRANSLATION_WORDS: &[&str] = &[
    "translate",
    "übersetze",
    "übersetz",
    "translation",
    "übersetzung",
    "in english",
    "auf englisch",
    "in german",
    "auf deutsch",
];

struct KeywordList {
    language: Language,
    /// Bureaucracy vocabulary; matched inside compounds.
    domain: &'static [&'static str],
    /// Function words; matched as whole tokens.
    common: &'static [&'static str],
}

static KEYWORD_LISTS: [KeywordList; 2] = [
    KeywordList {
        language: Language::German,
        domain: &[
            "bürgergeld",
            "antrag",
            "jobcenter",
            "formular",
            "hilfe",
            "dokument",
            "beantragen",
            "ausfüllen",
            "frage",
            "abschnitt",
            "bescheid",
            "behörde",
            "übersetzen",
            "erklären",
        ],
        common: &[
            "das", "die", "der", "ist", "und", "mit", "von", "zu", "auf", "für", "was", "wie",
            "wo", "wann", "warum", "welche", "können", "möchte", "bitte", "danke", "hallo",
            "ich", "bin",
        ],
    },
    KeywordList {
        language: Language::English,
        domain: &[
            "help",
            "form",
            "application",
            "document",
            "translate",
            "email",
            "write",
            "explain",
            "question",
            "section",
            "unemployment",
            "benefit",
        ],
        common: &[
            "the", "and", "is", "to", "of", "in", "for", "with", "on", "at", "what", "how",
            "where", "when", "why", "which", "can", "would", "please", "thank", "hello", "i",
            "am", "have", "will",
        ],
    },
];

static INSTITUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alts: Vec<String> = GERMAN_INSTITUTIONS
        .iter()
        .map(|inst| {
            // "amt" alone must be a whole word, the rest may inflect
            if *inst == "amt" {
                r"\bamt\b".to_owned()
            } else {
                format!(r"\b{}", regex::escape(inst))
            }
        })
        .collect();
    Regex::new(&format!("(?i){}", alts.join("|"))).expect("Invalid institution regex")
});

static COMMUNICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alts: Vec<String> = COMMUNICATION_WORDS
        .iter()
        .map(|w| format!(r"\b{}", regex::escape(w)))
        .collect();
    Regex::new(&format!("(?i){}", alts.join("|"))).expect("Invalid communication regex")
});

static FORM_CODE_NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(form|ha|wba|uf|kdu|vm|ek)\b").expect("Invalid form code regex")
});
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("Invalid regex"));
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("Invalid regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// Whether the text asks to write to a German institution.
pub fn is_institution_request(text: &str) -> bool {
    INSTITUTION_RE.is_match(text) && COMMUNICATION_RE.is_match(text)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Strips numbers, form codes and punctuation before detection.
pub fn clean_for_detection(text: &str) -> String {
    let cleaned = FORM_CODE_NOISE_RE.replace_all(text, "");
    let cleaned = DIGITS_RE.replace_all(&cleaned, "");
    let cleaned = PUNCTUATION_RE.replace_all(&cleaned, " ");
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_owned()
}

// =============================================================================
// Explicit indicator rules (first match wins)
// =============================================================================

struct ExplicitRule {
    tag: &'static str,
    language: Language,
    matches: fn(&str) -> bool,
}

fn wants_english(lower: &str) -> bool {
    contains_any(lower, SWITCH_TO_ENGLISH)
}

fn wants_german(lower: &str) -> bool {
    contains_any(lower, SWITCH_TO_GERMAN)
}

// Institution mail outranks a requested switch: letters to German offices are always German.
static EXPLICIT_RULES: [ExplicitRule; 3] = [
    ExplicitRule {
        tag: "institution_email",
        language: Language::German,
        matches: is_institution_request,
    },
    ExplicitRule {
        tag: "switch_to_english",
        language: Language::English,
        matches: wants_english,
    },
    ExplicitRule {
        tag: "switch_to_german",
        language: Language::German,
        matches: wants_german,
    },
];

// =============================================================================
// Classifier
// =============================================================================

pub struct LanguageClassifier {
    default_language: Language,
    detector: Box<dyn StatisticalDetector>,
}

impl LanguageClassifier {
    pub fn new(default_language: Language, detector: Box<dyn StatisticalDetector>) -> Self {
        Self {
            default_language,
            detector,
        }
    }

    pub fn with_whatlang(default_language: Language) -> Self {
        Self::new(default_language, Box::new(WhatlangDetector))
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub fn classify(&self, text: Option<&str>) -> Classification {
        let text = text.map(str::trim).unwrap_or_default();
        Classification {
            verdict: self.detect_language(text),
            intent: detect_intent(text),
            institution_email: !text.is_empty() && is_institution_request(text),
        }
    }

    pub fn detect_language(&self, text: &str) -> LanguageVerdict {
        if text.trim().is_empty() {
            return LanguageVerdict::fallback(self.default_language);
        }

        let lower = text.to_lowercase();
        if let Some(rule) = EXPLICIT_RULES.iter().find(|rule| (rule.matches)(&lower)) {
            log::debug!("explicit language rule `{}` matched", rule.tag);
            return LanguageVerdict {
                language: rule.language,
                confidence: Confidence::High,
                reason: DetectionReason::ExplicitIndicator,
            };
        }

        let cleaned = clean_for_detection(text);
        let keyword_verdict = self.detect_from_keywords(&cleaned);
        if cleaned.chars().count() < MIN_STATISTICAL_CHARS {
            return keyword_verdict;
        }

        match self.detect_statistically(&cleaned) {
            // A medium statistical verdict loses to a keyword verdict of at
            // least equal confidence that names a different language.
            Some(stat)
                if stat.confidence == Confidence::Medium
                    && keyword_verdict.reason == DetectionReason::KeywordDetection
                    && keyword_verdict.confidence >= Confidence::Medium
                    && keyword_verdict.language != stat.language =>
            {
                keyword_verdict
            }
            Some(stat) => stat,
            None => keyword_verdict,
        }
    }

    fn detect_statistically(&self, cleaned: &str) -> Option<LanguageVerdict> {
        let code = self.detector.detect(cleaned)?;
        let Some(language) = Language::from_code(&code) else {
            log::debug!("statistical detector returned unsupported language `{code}`");
            return None;
        };

        let confidence = if cleaned.chars().count() > HIGH_CONFIDENCE_CHARS {
            Confidence::High
        } else {
            Confidence::Medium
        };

        Some(LanguageVerdict {
            language,
            confidence,
            reason: DetectionReason::StatisticalDetection,
        })
    }

    fn detect_from_keywords(&self, cleaned: &str) -> LanguageVerdict {
        let lower = cleaned.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        if tokens.is_empty() {
            return LanguageVerdict::fallback(self.default_language);
        }

        let scores: Vec<(Language, usize, usize)> = KEYWORD_LISTS
            .iter()
            .map(|list| {
                let (matches, weighted) = score_tokens(&tokens, list);
                (list.language, matches, weighted)
            })
            .collect();

        let total = tokens.len() as f32;
        let ratio = |weighted: usize| weighted as f32 / total;

        let (german, english) = (scores[0], scores[1]);
        let winner = if german.1 >= 1 && ratio(german.2) > ratio(english.2) {
            Some(german)
        } else if english.1 >= 1 {
            Some(english)
        } else {
            None
        };

        match winner {
            Some((language, matches, _)) => LanguageVerdict {
                language,
                confidence: if matches >= 3 {
                    Confidence::High
                } else {
                    Confidence::Medium
                },
                reason: DetectionReason::KeywordDetection,
            },
            None => LanguageVerdict::fallback(self.default_language),
        }
    }
}

/// Returns (number of matching tokens, weighted score).
fn score_tokens(tokens: &[&str], list: &KeywordList) -> (usize, usize) {
    tokens.iter().fold((0, 0), |(matches, weighted), token| {
        if list.domain.iter().any(|term| token.contains(term)) {
            (matches + 1, weighted + DOMAIN_TERM_WEIGHT)
        } else if list.common.contains(token) {
            (matches + 1, weighted + 1)
        } else {
            (matches, weighted)
        }
    })
}

/// Detects whether the user wants an explanation, a translation, or both.
pub fn detect_intent(text: &str) -> Intent {
    if text.trim().is_empty() {
        return Intent::default();
    }

    let lower = text.to_lowercase();
    let wants_explanation = contains_any(&lower, EXPLANATION_WORDS);
    let wants_translation = contains_any(&lower, TRANSLATION_WORDS);

    if !wants_explanation && !wants_translation {
        return Intent::default();
    }

    Intent {
        wants_explanation,
        wants_translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Option<&'static str>);

    impl StatisticalDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Option<String> {
            self.0.map(str::to_owned)
        }
    }

    fn classifier(detected: Option<&'static str>) -> LanguageClassifier {
        LanguageClassifier::new(Language::English, Box::new(FixedDetector(detected)))
    }

    #[test]
    fn test_empty_text_falls_back() {
        let verdict = classifier(Some("de")).detect_language("   ");
        assert_eq!(verdict.language, Language::English);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.reason, DetectionReason::Fallback);

        let classification = classifier(None).classify(None);
        assert_eq!(classification.intent, Intent::default());
        assert!(!classification.institution_email);
    }

    #[test]
    fn test_explicit_switch_to_english() {
        let verdict = classifier(Some("de"))
            .detect_language("Kannst du mir den Bescheid bitte in English erklären?");
        assert_eq!(verdict.language, Language::English);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.reason, DetectionReason::ExplicitIndicator);
    }

    #[test]
    fn test_explicit_switch_to_german() {
        let verdict = classifier(Some("en")).detect_language("Please answer auf Deutsch");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.reason, DetectionReason::ExplicitIndicator);
    }

    #[test]
    fn test_institution_email_overrides_everything() {
        let c = classifier(Some("en"));
        let verdict =
            c.detect_language("Please write an email to the Jobcenter in English, thank you");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.confidence, Confidence::High);

        let classification = c.classify(Some("Write a letter to the Finanzamt"));
        assert!(classification.institution_email);
        assert_eq!(classification.response_language(), Language::German);
    }

    #[test]
    fn test_institution_without_communication_verb() {
        assert!(!is_institution_request("Where is the Jobcenter in Berlin?"));
        assert!(is_institution_request("Schreib eine Nachricht an die Krankenkasse"));
        // "amt" only as a whole word
        assert!(!is_institution_request("Write the total amount insgesamt"));
    }

    #[test]
    fn test_short_text_uses_keywords() {
        // detector would say English, but it must not be consulted
        let verdict = classifier(Some("en")).detect_language("Hallo, wie geht das?");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.reason, DetectionReason::KeywordDetection);
    }

    #[test]
    fn test_long_statistical_verdict_is_high() {
        let text = "I received a letter yesterday and I am not sure what they want from me now";
        let verdict = classifier(Some("en")).detect_language(text);
        assert_eq!(verdict.language, Language::English);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.reason, DetectionReason::StatisticalDetection);
    }

    #[test]
    fn test_unsupported_detection_falls_through_to_keywords() {
        let text = "Ich habe einen Bescheid vom Amt bekommen und verstehe ihn nicht";
        let verdict = classifier(Some("nl")).detect_language(text);
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.reason, DetectionReason::KeywordDetection);
    }

    #[test]
    fn test_undecided_detector_falls_through_to_keywords() {
        let verdict =
            classifier(None).detect_language("What is the deadline for the application?");
        assert_eq!(verdict.language, Language::English);
        assert_eq!(verdict.reason, DetectionReason::KeywordDetection);
    }

    #[test]
    fn test_keyword_verdict_wins_medium_disagreement() {
        let verdict = classifier(Some("en")).detect_language("How much Bürgergeld do I get?");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.reason, DetectionReason::KeywordDetection);
    }

    #[test]
    fn test_medium_agreement_keeps_statistical_reason() {
        let verdict = classifier(Some("de")).detect_language("How much Bürgergeld do I get?");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.reason, DetectionReason::StatisticalDetection);
        assert_eq!(verdict.confidence, Confidence::Medium);
    }

    #[test]
    fn test_no_keywords_falls_back_to_default() {
        let c = LanguageClassifier::new(Language::German, Box::new(FixedDetector(None)));
        let verdict = c.detect_language("zzz qqq");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.reason, DetectionReason::Fallback);
    }

    #[test]
    fn test_keyword_confidence_tiers() {
        let c = classifier(None);
        let verdict = c.detect_language("was ist das");
        assert_eq!(verdict.confidence, Confidence::High);

        let verdict = c.detect_language("danke");
        assert_eq!(verdict.language, Language::German);
        assert_eq!(verdict.confidence, Confidence::Medium);
    }

    #[test]
    fn test_clean_for_detection() {
        assert_eq!(
            clean_for_detection("Section 3 of the WBA form, please!"),
            "Section of the please"
        );
    }

    #[test]
    fn test_intent_defaults_to_explanation() {
        assert_eq!(detect_intent("Here is my letter"), Intent::default());
        assert_eq!(detect_intent(""), Intent::default());
    }

    #[test]
    fn test_intent_translation_only() {
        let intent = detect_intent("Bitte übersetze das");
        assert!(intent.wants_translation);
        assert!(!intent.wants_explanation);
    }

    #[test]
    fn test_intent_is_order_independent() {
        let a = detect_intent("Translate this and explain it");
        let b = detect_intent("Explain this and translate it");
        assert_eq!(a, b);
        assert_eq!(
            a,
            Intent {
                wants_explanation: true,
                wants_translation: true
            }
        );
    }

    #[test]
    fn test_whatlang_detector_on_clear_text() {
        let detector = WhatlangDetector;
        assert_eq!(
            detector
                .detect("Ich habe heute einen Brief von der Behörde bekommen und verstehe nicht, was sie von mir wollen.")
                .as_deref(),
            Some("de")
        );
        assert_eq!(
            detector
                .detect("I received a letter from the office today and I do not understand what they want from me.")
                .as_deref(),
            Some("en")
        );
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("DE"), Some(Language::German));
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("ar"), None);
        assert_eq!(Language::German.to_string(), "de");
    }
}
