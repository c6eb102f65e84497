//! OpenAI-compatible provider implementation.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI itself, vLLM, LiteLLM, Ollama's compatibility layer).

pub mod chat;
pub mod client;
pub mod types;
pub mod vision;

pub use chat::OpenAiChatProvider;
pub use client::OpenAiClient;
pub use vision::OpenAiVisionProvider;
