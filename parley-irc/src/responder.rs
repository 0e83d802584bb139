//! Turns a question plus recent history into a reply from the chat backend.

use crate::memory::{Role, Turn};
use async_trait::async_trait;
use parley_common::ChatCompletionConfig;
use parley_provider::{ChatRequest, Message, Provider};

/// Reply used when the backend reports an error or cannot be reached.
pub const API_ERROR_REPLY: &str = "Sorry, an API error occurred.";

/// Reply used when the backend answered with something unusable.
pub const UNEXPECTED_ERROR_REPLY: &str = "Sorry, an unexpected error occurred.";

/// Produces reply text. Never fails: errors become placeholder replies.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, question: &str, history: &[Turn]) -> String;
}

/// Responder backed by a chat-completion provider.
pub struct LlmResponder<P> {
    provider: P,
    settings: ChatCompletionConfig,
}

impl<P: Provider> LlmResponder<P> {
    pub fn new(provider: P, settings: ChatCompletionConfig) -> Self {
        Self { provider, settings }
    }

    /// System context, then `history` in order, then the question.
    pub fn build_request(&self, question: &str, history: &[Turn]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.settings.context.as_str()));
        messages.extend(history.iter().map(|turn| match turn.role {
            Role::User => Message::user(turn.content.as_str()),
            Role::Assistant => Message::assistant(turn.content.as_str()),
        }));
        messages.push(Message::user(question));

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            top_p: Some(self.settings.top_p),
            frequency_penalty: Some(self.settings.frequency_penalty),
            presence_penalty: Some(self.settings.presence_penalty),
        }
    }
}

#[async_trait]
impl<P: Provider> Responder for LlmResponder<P> {
    async fn respond(&self, question: &str, history: &[Turn]) -> String {
        let request = self.build_request(question, history);

        match self.provider.chat(request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) if e.is_service_error() => {
                tracing::warn!(
                    provider = %e.provider,
                    kind = e.kind.as_str(),
                    status = ?e.status_code,
                    error = %e,
                    "API error"
                );
                API_ERROR_REPLY.to_string()
            }
            Err(e) => {
                tracing::error!(
                    provider = %e.provider,
                    kind = e.kind.as_str(),
                    error = %e,
                    "Unexpected error from chat backend"
                );
                UNEXPECTED_ERROR_REPLY.to_string()
            }
        }
    }
}
