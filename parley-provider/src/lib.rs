//! Provider abstraction for chat-completion backends.
//!
//! The IRC side only needs one operation: send an ordered list of messages
//! with sampling parameters and get a single reply back. Failures are
//! classified so callers can tell a service-reported problem from an
//! unexpected one.

mod openai;

pub use openai::OpenAIProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for chat-completion providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Category of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401 / 403
    Auth,
    /// 429
    RateLimited,
    /// 400 / 404 / 422
    InvalidRequest,
    /// The request exceeded its timeout.
    Timeout,
    /// Connection could not be established or broke mid-request.
    Network,
    /// Any other non-success status.
    Service,
    /// The response could not be understood.
    Decode,
}

impl ProviderErrorKind {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimited,
            400 | 404 | 422 => Self::InvalidRequest,
            _ => Self::Service,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Service => "service",
            Self::Decode => "decode",
        }
    }
}

/// Error from a provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}:{model}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    /// Whether the failure was reported by, or on the way to, the service.
    ///
    /// `false` means the exchange completed but produced something unusable.
    pub fn is_service_error(&self) -> bool {
        self.kind != ProviderErrorKind::Decode
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in order, system prompt first
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus-sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(403), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(ProviderErrorKind::from_status(400), ProviderErrorKind::InvalidRequest);
        assert_eq!(ProviderErrorKind::from_status(503), ProviderErrorKind::Service);
    }

    #[test]
    fn test_decode_is_not_service_error() {
        let err = ProviderError {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            kind: ProviderErrorKind::Decode,
            message: "bad json".into(),
            status_code: None,
        };
        assert!(!err.is_service_error());
        assert_eq!(err.to_string(), "[openai:gpt-4o] bad json");

        let timeout = ProviderError {
            kind: ProviderErrorKind::Timeout,
            ..err
        };
        assert!(timeout.is_service_error());
    }

    #[test]
    fn test_request_skips_unset_parameters() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["temperature"], 0.2);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
