//! Extraction client: one call to the generative-extraction service.
//!
//! [`ExtractionClient`] is the seam between the pipeline and the network.
//! The production implementation, [`LlmExtractionClient`], drives an
//! `edgequake_llm::LLMProvider`; tests substitute scripted clients. The
//! client performs exactly one call per `extract` and never retries on its
//! own; retry policy belongs to [`crate::pipeline::validate`].

use crate::pipeline::encode::Payload;
use crate::prompts::{inline_document, ATTACHMENT_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Per-call hints forwarded to the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceHints {
    /// Determinism hint; low values keep extraction faithful.
    pub temperature: f32,
    pub max_tokens: usize,
    /// Extra output tokens reserved for model reasoning, if any.
    pub reasoning_budget: Option<usize>,
    /// Ask the service for JSON-formatted output (`response_format`).
    pub json_output: bool,
}

impl Default for ServiceHints {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 8192,
            reasoning_budget: None,
            json_output: true,
        }
    }
}

/// Everything needed for one extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub payload: &'a Payload,
    /// Full system prompt, JSON contract included.
    pub prompt: &'a str,
    /// Corrective follow-up after a failed validation.
    pub correction: Option<&'a str>,
    pub hints: ServiceHints,
}

/// Failure of the service itself (transport, auth, quota, timeout).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("provider call timed out after {0}s")]
    Timeout(u64),
}

/// Sends a document and prompt to the extraction service, returning raw text.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String, ServiceError>;
}

/// [`ExtractionClient`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmExtractionClient {
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for LlmExtractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmExtractionClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmExtractionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ExtractionClient for LlmExtractionClient {
    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String, ServiceError> {
        let messages = build_messages(request);
        let options = build_options(&request.hints);
        let start = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ServiceError::Provider(e.to_string()))?;

        debug!(
            "Extraction call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// System prompt, then one user turn carrying the document and any correction.
fn build_messages(request: &ExtractionRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(request.prompt)];
    match request.payload {
        Payload::Attachments(items) => {
            let text = request.correction.unwrap_or(ATTACHMENT_INSTRUCTION);
            messages.push(ChatMessage::user_with_images(text, items.clone()));
        }
        Payload::Text { name, content } => {
            let mut text = inline_document(name, content);
            if let Some(correction) = request.correction {
                text.push_str("\n\n");
                text.push_str(correction);
            }
            messages.push(ChatMessage::user(text));
        }
    }
    messages
}

/// Providers that support it (Gemini, OpenAI-compatible) switch to a JSON
/// response mode on `json_object`; the others ignore the field. The reasoning
/// budget raises the output ceiling so thinking tokens do not eat into the
/// JSON answer.
fn build_options(hints: &ServiceHints) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(hints.temperature),
        max_tokens: Some(
            hints
                .max_tokens
                .saturating_add(hints.reasoning_budget.unwrap_or(0)),
        ),
        response_format: hints.json_output.then(|| "json_object".to_string()),
        ..Default::default()
    }
}
