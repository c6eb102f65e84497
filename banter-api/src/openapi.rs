//! OpenAPI Document
//!
//! Aggregates every annotated route and schema into one document, served at
//! `/openapi.json` and rendered by Swagger UI at `/docs` when the
//! `swagger-ui` feature is enabled.

use utoipa::OpenApi;

use crate::auth::UserInfo;
use crate::pipeline::ChatRequest;
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use banter_core::{
    Attachment, AttachmentScope, Conversation, ConversationSummary, Message, MessageRole,
    SourcePassage,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BANTER Assistant API",
        description = "Authenticated, retrieval-augmented streaming chat backend",
    ),
    paths(
        crate::routes::health::summary,
        crate::routes::health::ping,
        crate::routes::health::liveness,
        crate::routes::health::readiness,
        crate::routes::chat::chat,
        crate::routes::user::current_user,
        crate::routes::conversation::list_conversations,
        crate::routes::conversation::list_messages,
        crate::routes::conversation::delete_conversation,
        crate::routes::attachment::upload_attachment,
        crate::routes::attachment::list_attachments,
        crate::routes::attachment::download_attachment,
        crate::routes::attachment::delete_attachment,
    ),
    components(schemas(
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
        ChatRequest,
        UserInfo,
        Conversation,
        ConversationSummary,
        Message,
        MessageRole,
        Attachment,
        AttachmentScope,
        SourcePassage,
    )),
    tags(
        (name = "Health", description = "Service health probes"),
        (name = "Chat", description = "Streaming retrieval-augmented chat"),
        (name = "Conversations", description = "Per-user conversation history"),
        (name = "Attachments", description = "File upload and retrieval context"),
        (name = "User", description = "Resolved caller identity"),
    ),
)]
pub struct ApiDoc;
