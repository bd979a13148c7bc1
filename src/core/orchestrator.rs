//! Turn orchestration.
//!
//! One request runs `start -> file_stage -> text_stage -> persist -> respond`.
//! Either stage is skipped when its input is missing. Every processed request
//! persists one user turn and exactly one assistant turn.

use crate::config::Settings;
use crate::core::context::{
    DOCUMENT_CONTEXT_CHARS, HISTORY_FETCH_LIMIT, HISTORY_TURN_CHARS, HISTORY_WINDOW,
    format_history, take_chars,
};
use crate::core::error::{HandlerError, StoreError, TurnError};
use crate::core::handlers::{
    FallbackHandler, FormHelper, HandlerContext, HandlerResponse, ModelCaller, RetrievalHandler,
    StrategyHandler,
};
use crate::core::language::{Classification, Language, LanguageClassifier};
use crate::core::prompts::PromptLibrary;
use crate::core::router::{MessageRouter, Route};
use crate::core::traits::{
    ConversationService, DocumentExtractor, KnowledgeBase, ModelClient, NewTurn, UploadedFile,
};
use crate::core::validation::{validate_chat_message, validate_file};
use crate::infrastructure::entities::{Conversation, FileInfo, Turn, TurnKind};
use di::{Ref, inject, injectable};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

pub const EMPTY_REQUEST_MESSAGE: &str = "Please provide a message or upload a file.";

/// Extracted text sent to the model for document analysis.
const DOCUMENT_PROMPT_CHARS: usize = 3000;

const STAGE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub message: Option<String>,
    pub files: Vec<UploadedFile>,
    /// Absent means the default conversation is used (and created if needed).
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResponse {
    pub response: String,
    pub kind: TurnKind,
    pub sources: Vec<String>,
    pub conversation_id: Uuid,
    /// The conversation's document context after this turn.
    pub document_context: Option<String>,
    pub language: Language,
    /// Final route of the text stage, after any escalation.
    pub route: Option<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Start,
    FileStage,
    TextStage,
    Persist,
    Respond,
}

impl Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStage::Start => "start",
            TurnStage::FileStage => "file_stage",
            TurnStage::TextStage => "text_stage",
            TurnStage::Persist => "persist",
            TurnStage::Respond => "respond",
        };
        f.write_str(name)
    }
}

struct FileStageOutcome {
    response: String,
    sources: Vec<String>,
    /// Combined extracted text, already truncated. `None` when nothing was extracted.
    document_context: Option<String>,
}

struct TextStageOutcome {
    handled: HandlerResponse,
    route: Route,
}

/// Serializes turns per conversation.
#[derive(Default)]
struct ConversationLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    default_conversation: AsyncMutex<()>,
}

impl ConversationLocks {
    async fn lock(&self, conversation_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(conversation_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct TurnOrchestrator {
    settings: Ref<Settings>,
    conversations: Ref<dyn ConversationService>,
    extractor: Ref<dyn DocumentExtractor>,
    classifier: LanguageClassifier,
    router: MessageRouter,
    prompts: Arc<PromptLibrary>,
    caller: ModelCaller,
    form_helper: FormHelper,
    retrieval: RetrievalHandler,
    fallback: FallbackHandler,
    locks: ConversationLocks,
}

#[injectable]
impl TurnOrchestrator {
    #[inject]
    pub fn create(
        settings: Ref<Settings>,
        conversations: Ref<dyn ConversationService>,
        model: Ref<dyn ModelClient>,
        knowledge: Ref<dyn KnowledgeBase>,
        extractor: Ref<dyn DocumentExtractor>,
    ) -> TurnOrchestrator {
        TurnOrchestrator::with_classifier(
            LanguageClassifier::with_whatlang(settings.default_language),
            settings,
            conversations,
            model,
            knowledge,
            extractor,
        )
    }
}

impl TurnOrchestrator {
    pub fn with_classifier(
        classifier: LanguageClassifier,
        settings: Ref<Settings>,
        conversations: Ref<dyn ConversationService>,
        model: Ref<dyn ModelClient>,
        knowledge: Ref<dyn KnowledgeBase>,
        extractor: Ref<dyn DocumentExtractor>,
    ) -> TurnOrchestrator {
        let prompts = Arc::new(PromptLibrary::new());
        let caller = ModelCaller::new(model, settings.model_timeout);

        TurnOrchestrator {
            form_helper: FormHelper::new(caller.clone(), prompts.clone()),
            retrieval: RetrievalHandler::new(
                caller.clone(),
                prompts.clone(),
                knowledge,
                settings.retrieval_top_k,
            ),
            fallback: FallbackHandler::new(caller.clone(), prompts.clone()),
            caller,
            prompts,
            classifier,
            router: MessageRouter::new(),
            locks: ConversationLocks::default(),
            settings,
            conversations,
            extractor,
        }
    }

    /// Language a reply (or an error) to `message` is written in.
    pub fn response_language(&self, message: Option<&str>) -> Language {
        self.classifier.classify(message).response_language()
    }

    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        debug!("Turn stage: {}", TurnStage::Start);

        let message = match request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
        {
            Some(message) => Some(
                validate_chat_message(message)
                    .map_err(TurnError::Validation)?
                    .to_owned(),
            ),
            None => None,
        };
        if message.is_none() && request.files.is_empty() {
            return Err(TurnError::Validation(EMPTY_REQUEST_MESSAGE.to_owned()));
        }

        let valid_files = self.validate_files(&request.files)?;

        let (conversation, _guard) = self.resolve_conversation(request.conversation_id).await?;
        let conversation_id = conversation.id;

        let history = self
            .conversations
            .recent_turns(conversation_id, HISTORY_FETCH_LIMIT)
            .await?;

        let classification = self.classifier.classify(message.as_deref());
        let language = classification.response_language();
        debug!(
            "Classified turn for {conversation_id}: {} ({:?}, {:?})",
            classification.verdict.language,
            classification.verdict.confidence,
            classification.verdict.reason
        );

        let file_info = (!request.files.is_empty()).then(|| FileInfo {
            count: request.files.len(),
            filenames: request.files.iter().map(|f| f.filename.clone()).collect(),
            total_size: request.files.iter().map(UploadedFile::size).sum(),
        });
        self.conversations
            .append_turn(
                conversation_id,
                NewTurn::user(message.clone().unwrap_or_default(), file_info),
            )
            .await?;

        let mut document_context = conversation.document_context.clone();

        let file_outcome = if valid_files.is_empty() {
            None
        } else {
            debug!("Turn stage: {}", TurnStage::FileStage);
            let outcome = self
                .file_stage(&valid_files, &classification, &history, language)
                .await;
            if let Some(extracted) = &outcome.document_context {
                self.conversations
                    .update_document_context(conversation_id, extracted)
                    .await?;
                document_context = Some(extracted.clone());
            }
            Some(outcome)
        };

        let text_outcome = match message.as_deref() {
            Some(text) => {
                debug!("Turn stage: {}", TurnStage::TextStage);
                Some(
                    self.text_stage(text, &classification, &history, document_context.as_deref())
                        .await,
                )
            }
            None => None,
        };
        let route = text_outcome.as_ref().map(|outcome| outcome.route);

        let (response, kind, sources) = merge_stages(file_outcome, text_outcome, language)
            .ok_or_else(|| TurnError::Validation(EMPTY_REQUEST_MESSAGE.to_owned()))?;

        debug!("Turn stage: {}", TurnStage::Persist);
        self.conversations
            .append_turn(
                conversation_id,
                NewTurn::assistant(response.clone(), kind, sources.clone()),
            )
            .await?;

        debug!("Turn stage: {}", TurnStage::Respond);
        info!(
            "Completed {} turn for conversation {conversation_id} ({} sources)",
            kind.as_str(),
            sources.len()
        );

        Ok(TurnResponse {
            response,
            kind,
            sources,
            conversation_id,
            document_context,
            language,
            route,
        })
    }

    /// Valid files in upload order. Fails only when every uploaded file is invalid.
    fn validate_files<'a>(
        &self,
        files: &'a [UploadedFile],
    ) -> Result<Vec<&'a UploadedFile>, TurnError> {
        let mut valid = Vec::with_capacity(files.len());
        let mut first_error = None;

        for file in files {
            match validate_file(file, self.settings.max_file_size) {
                Ok(()) => valid.push(file),
                Err(reason) => {
                    warn!("Skipping invalid upload {}: {reason}", file.filename);
                    first_error.get_or_insert(reason);
                }
            }
        }

        match first_error {
            Some(reason) if valid.is_empty() => Err(TurnError::FileValidation(reason)),
            _ => Ok(valid),
        }
    }

    async fn resolve_conversation(
        &self,
        conversation_id: Option<Uuid>,
    ) -> Result<(Conversation, OwnedMutexGuard<()>), TurnError> {
        match conversation_id {
            Some(id) => {
                let guard = self.locks.lock(id).await;
                let conversation = self
                    .conversations
                    .get_conversation(id)
                    .await
                    .map_err(|e| match e {
                        StoreError::ConversationNotFound(id) => TurnError::ConversationNotFound(id),
                        other => TurnError::Persistence(other),
                    })?;
                Ok((conversation, guard))
            }
            None => {
                let _default = self.locks.default_conversation.lock().await;
                let conversation = self.conversations.get_or_create_default().await?;
                let guard = self.locks.lock(conversation.id).await;
                Ok((conversation, guard))
            }
        }
    }

    async fn file_stage(
        &self,
        files: &[&UploadedFile],
        classification: &Classification,
        history: &[Turn],
        language: Language,
    ) -> FileStageOutcome {
        let mut pages: Vec<(&str, String)> = Vec::with_capacity(files.len());
        for file in files {
            match self.extractor.extract_text(file).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Extracted {} chars from {}", text.chars().count(), file.filename);
                    pages.push((file.filename.as_str(), text));
                }
                Ok(_) => warn!("No text extracted from {}", file.filename),
                Err(e) => warn!("Failed to extract text from {}: {e}", file.filename),
            }
        }

        if pages.is_empty() {
            return FileStageOutcome {
                response: no_text_message(language).to_owned(),
                sources: Vec::new(),
                document_context: None,
            };
        }

        let combined = if pages.len() == 1 {
            pages[0].1.clone()
        } else {
            pages
                .iter()
                .enumerate()
                .map(|(i, (filename, text))| format!("--- PAGE {} ({filename}) ---\n\n{text}", i + 1))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        let sources: Vec<String> = pages.iter().map(|(filename, _)| filename.to_string()).collect();

        let response = match self
            .analyze_document(&combined, pages.len(), classification, history, language)
            .await
        {
            Ok(analysis) => format!("{}{analysis}", analysis_header(language, pages.len())),
            Err(e) => {
                warn!("Document analysis failed: {e}");
                analysis_failed_message(language).to_owned()
            }
        };

        FileStageOutcome {
            response,
            sources,
            document_context: Some(take_chars(&combined, DOCUMENT_CONTEXT_CHARS)),
        }
    }

    async fn analyze_document(
        &self,
        text: &str,
        page_count: usize,
        classification: &Classification,
        history: &[Turn],
        language: Language,
    ) -> Result<String, HandlerError> {
        let history = format_history(history, HISTORY_WINDOW, HISTORY_TURN_CHARS);
        let system_prompt = self.prompts.document_analysis(
            language,
            classification.intent,
            page_count,
            history.as_deref(),
        )?;
        let user_text = format!(
            "Analyze this document:\n\n{}",
            take_chars(text, DOCUMENT_PROMPT_CHARS)
        );
        self.caller.call(&user_text, &system_prompt).await
    }

    async fn text_stage(
        &self,
        text: &str,
        classification: &Classification,
        history: &[Turn],
        document_context: Option<&str>,
    ) -> TextStageOutcome {
        let decision = self.router.route(text, history);
        info!("Routed message to {}", decision.route);

        let mut ctx = HandlerContext {
            text: &decision.text,
            classification,
            route: decision.route,
            history,
            document_context,
        };

        if ctx.route == Route::Form {
            match self.form_helper.handle(&ctx).await {
                Ok(handled) => {
                    return TextStageOutcome {
                        handled: HandlerResponse {
                            response: format!("📝 **Form Help:**\n\n{}", handled.response),
                            ..handled
                        },
                        route: Route::Form,
                    };
                }
                Err(e) => {
                    warn!(
                        "{} failed, retrying through {}: {e}",
                        self.form_helper.name(),
                        self.retrieval.name()
                    );
                    ctx.route = Route::General;
                }
            }
        }

        let handled = match self.retrieval.handle(&ctx).await {
            Ok(handled) => handled,
            Err(e) => {
                warn!("{} failed, using fallback: {e}", self.retrieval.name());
                self.fallback.respond(&ctx).await
            }
        };

        TextStageOutcome {
            handled,
            route: ctx.route,
        }
    }
}

/// Combines the stage outputs into `(response, kind, sources)`.
fn merge_stages(
    file: Option<FileStageOutcome>,
    text: Option<TextStageOutcome>,
    language: Language,
) -> Option<(String, TurnKind, Vec<String>)> {
    match (file, text) {
        (Some(file), Some(text)) => {
            let mut response = format!("{}{STAGE_SEPARATOR}{}", file.response, text.handled.response);
            let additional: Vec<String> = text
                .handled
                .sources
                .into_iter()
                .filter(|source| !file.sources.contains(source))
                .collect();
            if !additional.is_empty() {
                response.push_str(&format!(
                    "\n\n{} {}",
                    additional_references_label(language),
                    additional.join(", ")
                ));
            }

            let mut sources = file.sources;
            sources.extend(additional);
            Some((response, TurnKind::Document, sources))
        }
        (Some(file), None) => Some((file.response, TurnKind::Document, file.sources)),
        (None, Some(text)) => {
            let kind = if text.route == Route::Form {
                TurnKind::Form
            } else {
                TurnKind::Chat
            };
            Some((text.handled.response, kind, text.handled.sources))
        }
        (None, None) => None,
    }
}

pub fn no_text_message(language: Language) -> &'static str {
    match language {
        Language::German => {
            "Ich konnte keinen lesbaren Text aus diesem Dokument extrahieren. Bitte stelle sicher, dass es klar und gut gescannt ist."
        }
        Language::English => {
            "I couldn't extract readable text from this document. Please ensure it's clear and well-scanned."
        }
    }
}

fn analysis_failed_message(language: Language) -> &'static str {
    match language {
        Language::German => "📄 Dokumente verarbeitet, aber bei der Analyse gab es Probleme.",
        Language::English => "📄 Documents processed but had trouble analyzing them.",
    }
}

fn analysis_header(language: Language, page_count: usize) -> String {
    match (language, page_count) {
        (Language::German, 1) => "📄 **Dokumentanalyse:**\n\n".to_owned(),
        (Language::English, 1) => "📄 **Document Analysis:**\n\n".to_owned(),
        (Language::German, n) => format!("📄 **Mehrseitige Dokumentanalyse ({n} Seiten):**\n\n"),
        (Language::English, n) => format!("📄 **Multi-Page Document Analysis ({n} pages):**\n\n"),
    }
}

fn additional_references_label(language: Language) -> &'static str {
    match language {
        Language::German => "📖 **Weitere Quellen:**",
        Language::English => "📖 **Additional references:**",
    }
}
