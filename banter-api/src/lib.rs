//! BANTER API - HTTP Layer
//!
//! This crate exposes the assistant over HTTP (Axum): streaming chat via
//! SSE, attachment upload/download, conversation history, and the resolved
//! caller profile. Identity comes from an OIDC access token or, behind a
//! trusted proxy, from forwarded headers; everything except health probes
//! and the OpenAPI document sits behind that resolution.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod oidc;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod pipeline;
pub mod routes;
pub mod sse;
pub mod state;

// Re-export commonly used types
pub use auth::{require_admin, AuthConfig, IdentityResolver, UserInfo};
pub use config::{ApiConfig, FilesConfig, LlmConfig, StoreConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::auth::{auth_middleware, AuthMiddlewareState, IdentityExtractor};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use pipeline::{run_chat, ChatRequest};
pub use routes::create_api_router;
pub use sse::StreamEvent;
pub use state::AppState;
