//! HTTP-backed provider implementations.

use banter_core::{BanterError, LlmError};

pub mod openai;
pub mod retrieval;

pub use openai::{OpenAiChatProvider, OpenAiClient, OpenAiVisionProvider};
pub use retrieval::{HttpIngestor, HttpRetriever};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> BanterError {
    BanterError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> BanterError {
    BanterError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> BanterError {
    BanterError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

pub(crate) fn stream_interrupted(provider: &str, reason: impl Into<String>) -> BanterError {
    BanterError::Llm(LlmError::StreamInterrupted {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}
