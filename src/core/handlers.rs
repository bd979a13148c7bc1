//! Strategy handlers and the model call they share.
//!
//! Escalation is owned by the orchestrator: a failed [`FormHelper`] falls through to the
//! [`RetrievalHandler`], a failed retrieval to the [`FallbackHandler`], which never fails.

use crate::core::context::{
    ContextAssembler, FALLBACK_TURN_CHARS, HISTORY_TURN_CHARS, HISTORY_WINDOW, format_history,
};
use crate::core::error::HandlerError;
use crate::core::language::{Classification, Confidence, Language};
use crate::core::prompts::PromptLibrary;
use crate::core::router::Route;
use crate::core::traits::{KnowledgeBase, ModelClient};
use crate::infrastructure::entities::Turn;
use async_trait::async_trait;
use di::Ref;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler may look at for one text turn.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub text: &'a str,
    pub classification: &'a Classification,
    pub route: Route,
    /// Recent turns in chronological order, excluding the current one.
    pub history: &'a [Turn],
    pub document_context: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub response: String,
    pub sources: Vec<String>,
    pub used_knowledge_base: bool,
}

impl HandlerResponse {
    pub fn new(response: String, sources: Vec<String>) -> Self {
        HandlerResponse {
            used_knowledge_base: !sources.is_empty(),
            response,
            sources,
        }
    }
}

#[async_trait]
pub trait StrategyHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError>;
}

/// Model call with a caller-imposed timeout.
#[derive(Clone)]
pub struct ModelCaller {
    model: Ref<dyn ModelClient>,
    timeout: Duration,
}

impl ModelCaller {
    pub fn new(model: Ref<dyn ModelClient>, timeout: Duration) -> Self {
        ModelCaller { model, timeout }
    }

    pub async fn call(&self, user_text: &str, system_prompt: &str) -> Result<String, HandlerError> {
        match tokio::time::timeout(self.timeout, self.model.complete(user_text, system_prompt)).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(HandlerError::Timeout(self.timeout)),
        }
    }
}

// =============================================================================
// Form Helper
// =============================================================================

pub struct FormHelper {
    caller: ModelCaller,
    prompts: Arc<PromptLibrary>,
}

impl FormHelper {
    pub fn new(caller: ModelCaller, prompts: Arc<PromptLibrary>) -> Self {
        FormHelper { caller, prompts }
    }
}

#[async_trait]
impl StrategyHandler for FormHelper {
    fn name(&self) -> &'static str {
        "form_helper"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
        let history = format_history(ctx.history, HISTORY_WINDOW, HISTORY_TURN_CHARS);
        let system_prompt = self.prompts.form_helper(history.as_deref())?;

        let response = self.caller.call(ctx.text, &system_prompt).await?;
        Ok(HandlerResponse::new(response, Vec::new()))
    }
}

// =============================================================================
// Retrieval Handler
// =============================================================================

pub struct RetrievalHandler {
    caller: ModelCaller,
    prompts: Arc<PromptLibrary>,
    knowledge: Ref<dyn KnowledgeBase>,
    assembler: ContextAssembler,
    top_k: usize,
}

impl RetrievalHandler {
    pub fn new(
        caller: ModelCaller,
        prompts: Arc<PromptLibrary>,
        knowledge: Ref<dyn KnowledgeBase>,
        top_k: usize,
    ) -> Self {
        RetrievalHandler {
            caller,
            prompts,
            knowledge,
            assembler: ContextAssembler::default(),
            top_k,
        }
    }

    /// Response language and confidence for this turn.
    ///
    /// Institution emails are always written in German.
    pub fn effective_language(ctx: &HandlerContext<'_>) -> (Language, Confidence) {
        if ctx.route == Route::InstitutionEmail || ctx.classification.institution_email {
            (Language::German, Confidence::High)
        } else {
            (
                ctx.classification.verdict.language,
                ctx.classification.verdict.confidence,
            )
        }
    }
}

#[async_trait]
impl StrategyHandler for RetrievalHandler {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
        let (language, confidence) = Self::effective_language(ctx);
        let institution_email = ctx.route == Route::InstitutionEmail;

        let snippets = match tokio::time::timeout(
            self.caller.timeout,
            self.knowledge.search(ctx.text, self.top_k),
        )
        .await
        {
            Ok(Ok(snippets)) => snippets,
            Ok(Err(e)) => {
                warn!("Knowledge base search failed, answering without snippets: {e}");
                Vec::new()
            }
            Err(_) => {
                warn!("Knowledge base search timed out, answering without snippets");
                Vec::new()
            }
        };
        debug!("Knowledge base returned {} snippets", snippets.len());

        let context = self
            .assembler
            .assemble(ctx.history, &snippets, ctx.document_context);

        let system_prompt = self.prompts.retrieval(
            language,
            confidence,
            institution_email,
            context.has_history,
            &context.text,
        )?;

        let response = self.caller.call(ctx.text, &system_prompt).await?;
        Ok(HandlerResponse::new(response, context.sources))
    }
}

// =============================================================================
// Fallback Handler
// =============================================================================

pub fn generic_error_message(language: Language) -> &'static str {
    match language {
        Language::German => "❌ Es ist ein Fehler aufgetreten. Bitte versuche es erneut.",
        Language::English => "❌ I encountered an error. Please try again.",
    }
}

/// Last resort: persona plus condensed history, no retrieval.
pub struct FallbackHandler {
    caller: ModelCaller,
    prompts: Arc<PromptLibrary>,
}

impl FallbackHandler {
    pub fn new(caller: ModelCaller, prompts: Arc<PromptLibrary>) -> Self {
        FallbackHandler { caller, prompts }
    }

    /// Always yields a response; failures become the generic error message.
    pub async fn respond(&self, ctx: &HandlerContext<'_>) -> HandlerResponse {
        let (language, _) = RetrievalHandler::effective_language(ctx);

        match self.try_respond(ctx, language).await {
            Ok(response) => HandlerResponse::new(response, Vec::new()),
            Err(e) => {
                warn!("Fallback handler failed: {e}");
                HandlerResponse::new(generic_error_message(language).to_owned(), Vec::new())
            }
        }
    }

    async fn try_respond(
        &self,
        ctx: &HandlerContext<'_>,
        language: Language,
    ) -> Result<String, HandlerError> {
        let history = format_history(ctx.history, HISTORY_WINDOW, FALLBACK_TURN_CHARS);
        let system_prompt = self.prompts.fallback(language, history.as_deref())?;
        self.caller.call(ctx.text, &system_prompt).await
    }
}
