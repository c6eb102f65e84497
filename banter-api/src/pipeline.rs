//! Streaming-Chat Session Pipeline
//!
//! `run_chat` drives one chat exchange: resolve the conversation, persist
//! the question, authorize referenced attachments, assemble context,
//! stream generation, persist the answer, emit the protocol events.
//!
//! Failure handling is split in two by design. Everything up to the first
//! event is fatal and surfaces as an HTTP status (the response headers have
//! not been sent). Once streaming starts, failures become an in-stream
//! `error` event; exactly one terminal event is emitted either way.
//! History persistence is best-effort on both sides of the stream and goes
//! through [`best_effort`], which consumes the `Result` and logs, so the
//! signature itself shows a write cannot abort the answer.

use crate::error::{ApiError, ApiResult};
use crate::sse::StreamEvent;
use crate::state::AppState;
use async_stream::stream;
use banter_core::{
    truncate_chars, Attachment, AttachmentScope, AuthError, BanterResult, MessageRole,
    SourcePassage, UserIdentity,
};
use banter_llm::{clamp_top_k, context_blocks, DEFAULT_TOP_K};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

/// Sources events carry at most this many characters of passage text.
pub const SOURCE_SNIPPET_CHARS: usize = 700;

/// Placeholder caption for attachments that have no description yet.
const NO_DESCRIPTION: &str = "no description available";

// ============================================================================
// REQUEST SHAPE
// ============================================================================

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatRequest {
    /// The user's question. Must be non-empty.
    pub message: String,

    /// Number of passages to retrieve; clamped server-side to [1, 20].
    #[serde(default = "default_top_k")]
    pub top_k: i64,

    /// Whether to emit a `sources` event with the retrieved context.
    #[serde(default = "default_true")]
    pub include_citations: bool,

    /// Conversation to resume; omitted starts a fresh one. An unknown id is
    /// created as given, it is a resume hint rather than a lookup.
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Attachments to place into the generation context.
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

fn default_true() -> bool {
    true
}

// ============================================================================
// BEST-EFFORT WRITES
// ============================================================================

/// Consume a best-effort result, logging failure instead of propagating it.
pub fn best_effort<T>(operation: &str, result: BanterResult<T>) {
    if let Err(e) = result {
        tracing::warn!(operation, error = %e, "best-effort operation failed");
    }
}

// ============================================================================
// ATTACHMENT AUTHORIZATION
// ============================================================================

/// Read/use authorization: system attachments are readable by anyone,
/// user attachments only by their owner or an admin.
pub fn authorize_attachment_read(
    identity: &UserIdentity,
    attachment: &Attachment,
    admin_group: &str,
) -> Result<(), AuthError> {
    match attachment.scope {
        AttachmentScope::System => Ok(()),
        AttachmentScope::User => {
            if attachment.is_owned_by(&identity.user_id) || identity.is_admin(admin_group) {
                Ok(())
            } else {
                Err(AuthError::forbidden("Not allowed to access this attachment"))
            }
        }
    }
}

/// Delete authorization: system attachments require admin, user attachments
/// their owner or an admin.
pub fn authorize_attachment_delete(
    identity: &UserIdentity,
    attachment: &Attachment,
    admin_group: &str,
) -> Result<(), AuthError> {
    match attachment.scope {
        AttachmentScope::System => {
            if identity.is_admin(admin_group) {
                Ok(())
            } else {
                Err(AuthError::forbidden(
                    "Only admins may delete system attachments",
                ))
            }
        }
        AttachmentScope::User => {
            if attachment.is_owned_by(&identity.user_id) || identity.is_admin(admin_group) {
                Ok(())
            } else {
                Err(AuthError::forbidden("Not allowed to delete this attachment"))
            }
        }
    }
}

/// Load and authorize every referenced attachment. Unknown ids are 404,
/// scope violations 403; both abort before any event is emitted.
async fn resolve_attachments(
    state: &AppState,
    identity: &UserIdentity,
    ids: &[String],
) -> ApiResult<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(ids.len());
    for id in ids {
        let attachment = state
            .store
            .get_attachment(id)
            .await?
            .ok_or_else(|| ApiError::attachment_not_found(id))?;
        authorize_attachment_read(identity, &attachment, state.admin_group())?;
        attachments.push(attachment);
    }
    Ok(attachments)
}

// ============================================================================
// CONTEXT ASSEMBLY
// ============================================================================

/// Synthetic context block describing the caller's attached files, placed
/// ahead of any retrieved passages.
fn attached_files_block(attachments: &[Attachment]) -> Option<String> {
    if attachments.is_empty() {
        return None;
    }
    let mut lines = vec!["Attached files:".to_string()];
    for attachment in attachments {
        lines.push(format!(
            "- {} ({}, {} scope): {}",
            attachment.filename,
            attachment.content_type.as_deref().unwrap_or("unknown type"),
            attachment.scope.as_db_str(),
            attachment.caption.as_deref().unwrap_or(NO_DESCRIPTION),
        ));
    }
    Some(lines.join("\n"))
}

/// Passages as sent in the `sources` event, with text bounded.
fn source_views(passages: &[SourcePassage]) -> Vec<SourcePassage> {
    passages
        .iter()
        .map(|p| SourcePassage {
            text: truncate_chars(&p.text, SOURCE_SNIPPET_CHARS),
            ..p.clone()
        })
        .collect()
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run one chat exchange, yielding the protocol event sequence.
///
/// Errors returned here happened before any event and map to an HTTP
/// status; the stream itself never fails, it ends in `done` or `error`.
pub async fn run_chat(
    state: AppState,
    identity: UserIdentity,
    request: ChatRequest,
) -> ApiResult<impl Stream<Item = StreamEvent> + Send> {
    if request.message.trim().is_empty() {
        return Err(ApiError::missing_field("message"));
    }

    let conversation = state
        .store
        .get_or_create_conversation(&identity.user_id, request.conversation_id.as_deref())
        .await?;

    best_effort(
        "persist user message",
        state
            .store
            .append_message(
                &identity.user_id,
                &conversation.conversation_id,
                MessageRole::User,
                &request.message,
            )
            .await
            .map(|_| ()),
    );

    let attachments = resolve_attachments(&state, &identity, &request.attachment_ids).await?;

    let passages = state
        .retriever
        .retrieve(&request.message, clamp_top_k(request.top_k))
        .await?;

    let mut blocks = Vec::new();
    if let Some(block) = attached_files_block(&attachments) {
        blocks.push(block);
    }
    blocks.extend(context_blocks(&passages));

    let sources = request.include_citations.then(|| source_views(&passages));

    // Open the generation stream before the first event so connect/auth
    // failures still map to an HTTP status.
    let mut tokens = state.chat.stream_chat(&request.message, &blocks).await?;

    let store = state.store.clone();
    let user_id = identity.user_id.clone();
    let conversation_id = conversation.conversation_id.clone();

    Ok(stream! {
        yield StreamEvent::Meta {
            conversation_id: conversation_id.clone(),
        };

        if let Some(sources) = sources {
            yield StreamEvent::Sources(sources);
        }

        let mut answer = String::new();
        let mut failure = None;
        while let Some(item) = tokens.next().await {
            match item {
                Ok(fragment) => {
                    answer.push_str(&fragment);
                    yield StreamEvent::Token(fragment);
                }
                Err(e) => {
                    tracing::error!(error = %e, "generation stream failed");
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if !answer.is_empty() {
            best_effort(
                "persist assistant message",
                store
                    .append_message(
                        &user_id,
                        &conversation_id,
                        MessageRole::Assistant,
                        &answer,
                    )
                    .await
                    .map(|_| ()),
            );
        }

        match failure {
            Some(message) => yield StreamEvent::Error(message),
            None => yield StreamEvent::Done,
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, IdentityResolver};
    use crate::config::FilesConfig;
    use crate::oidc::{FixedClock, HttpKeyFetcher, KeyCache};
    use banter_llm::{MockChatProvider, MockIngestor, MockRetriever, MockVisionProvider};
    use banter_storage::{ChatStore, MemoryFileStore, MemoryStore};
    use banter_test_utils::fixtures;
    use futures_util::StreamExt;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn passage(source: &str, text: &str, score: f32) -> SourcePassage {
        SourcePassage {
            source: source.to_string(),
            title: None,
            text: text.to_string(),
            score,
            metadata: None,
        }
    }

    fn test_state(chat: MockChatProvider, passages: Vec<SourcePassage>) -> AppState {
        let config = AuthConfig::default();
        let fetcher = Arc::new(HttpKeyFetcher::new(Duration::from_secs(1)).unwrap());
        let keys = KeyCache::new(fetcher, Arc::new(FixedClock::new()), config.key_ttl, None);
        AppState {
            store: Arc::new(MemoryStore::new()),
            files: Arc::new(MemoryFileStore::new()),
            chat: Arc::new(chat),
            vision: Arc::new(MockVisionProvider::new("a chart")),
            retriever: Arc::new(MockRetriever::new(passages)),
            ingestor: Arc::new(MockIngestor::default()),
            resolver: Arc::new(IdentityResolver::new(config, keys)),
            files_config: FilesConfig::default(),
            start_time: Instant::now(),
        }
    }

    fn chat_request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            top_k: 3,
            include_citations: false,
            conversation_id: None,
            attachment_ids: Vec::new(),
        }
    }

    async fn collect(
        state: AppState,
        identity: UserIdentity,
        request: ChatRequest,
    ) -> Vec<StreamEvent> {
        run_chat(state, identity, request)
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_end_to_end_without_citations() {
        let state = test_state(MockChatProvider::new("Hi there, friend!"), Vec::new());
        let identity = fixtures::jwt_identity("alice");
        let events = collect(state.clone(), identity, chat_request("Hello")).await;

        // meta first, no sources, tokens reconstructing the answer, done last.
        let StreamEvent::Meta { conversation_id } = &events[0] else {
            panic!("expected meta first, got {:?}", events[0]);
        };
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Sources(_))));

        let answer: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answer, "Hi there, friend!");
        assert_eq!(events.last(), Some(&StreamEvent::Done));

        // Both sides of the exchange were persisted.
        let messages = state
            .store
            .list_messages("alice", conversation_id, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "Hi there, friend!");
    }

    #[tokio::test]
    async fn test_protocol_completeness() {
        let state = test_state(
            MockChatProvider::new("Answer text"),
            vec![passage("doc-a", "context", 0.9)],
        );
        let mut request = chat_request("question");
        request.include_citations = true;
        let events = collect(state, fixtures::jwt_identity("alice"), request).await;

        assert!(matches!(events[0], StreamEvent::Meta { .. }));
        let sources_count = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Sources(_)))
            .count();
        assert_eq!(sources_count, 1);
        let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal_count, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_sources_event_truncates_text() {
        let long_text = "x".repeat(2 * SOURCE_SNIPPET_CHARS);
        let state = test_state(
            MockChatProvider::new("ok"),
            vec![passage("doc-a", &long_text, 0.9)],
        );
        let mut request = chat_request("question");
        request.include_citations = true;
        let events = collect(state, fixtures::jwt_identity("alice"), request).await;

        let sources = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::Sources(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(sources[0].text.chars().count(), SOURCE_SNIPPET_CHARS);
    }

    #[tokio::test]
    async fn test_stream_interruption_emits_error_terminal() {
        let state = test_state(
            MockChatProvider::interrupting("one two three four", 2),
            Vec::new(),
        );
        let events = collect(state, fixtures::jwt_identity("alice"), chat_request("q")).await;

        let tokens = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Token(_)))
            .count();
        assert_eq!(tokens, 2);
        assert!(matches!(events.last(), Some(StreamEvent::Error(_))));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_fatal() {
        let state = test_state(MockChatProvider::new("ok"), Vec::new());
        let err = run_chat(
            state,
            fixtures::jwt_identity("alice"),
            chat_request("   "),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::MissingField);
    }

    #[tokio::test]
    async fn test_conversation_id_resumes_and_persists() {
        let state = test_state(MockChatProvider::new("first"), Vec::new());
        let identity = fixtures::jwt_identity("alice");

        let mut request = chat_request("one");
        request.conversation_id = Some("resume-me".to_string());
        let events = collect(state.clone(), identity.clone(), request).await;
        let StreamEvent::Meta { conversation_id } = &events[0] else {
            panic!("expected meta");
        };
        assert_eq!(conversation_id, "resume-me");

        let mut request = chat_request("two");
        request.conversation_id = Some("resume-me".to_string());
        collect(state.clone(), identity, request).await;

        let messages = state
            .store
            .list_messages("alice", "resume-me", 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn test_foreign_attachment_is_fatal_forbidden() {
        let state = test_state(MockChatProvider::new("ok"), Vec::new());
        let attachment = fixtures::user_attachment("att-1", "bob");
        state.store.record_attachment(&attachment).await.unwrap();

        let mut request = chat_request("q");
        request.attachment_ids = vec!["att-1".to_string()];
        let err = run_chat(state, fixtures::jwt_identity("alice"), request)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_unknown_attachment_is_fatal_not_found() {
        let state = test_state(MockChatProvider::new("ok"), Vec::new());
        let mut request = chat_request("q");
        request.attachment_ids = vec!["missing".to_string()];
        let err = run_chat(state, fixtures::jwt_identity("alice"), request)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::AttachmentNotFound);
    }

    #[tokio::test]
    async fn test_attached_files_block_precedes_passages() {
        // The mock provider ignores context, so assert on the assembly
        // helpers directly.
        let attachment = fixtures::user_attachment("att-1", "alice");
        let block = attached_files_block(std::slice::from_ref(&attachment)).unwrap();
        assert!(block.starts_with("Attached files:"));
        assert!(block.contains("notes.txt"));
        assert!(block.contains(NO_DESCRIPTION));

        assert!(attached_files_block(&[]).is_none());
    }

    #[test]
    fn test_read_authorization_matrix() {
        let admin = fixtures::jwt_identity_with_groups("root", &["assistant-admins"]);
        let owner = fixtures::jwt_identity("alice");
        let other = fixtures::jwt_identity("bob");
        let group = "assistant-admins";

        let system = fixtures::system_attachment("sys-1");
        assert!(authorize_attachment_read(&other, &system, group).is_ok());

        let user = fixtures::user_attachment("usr-1", "alice");
        assert!(authorize_attachment_read(&owner, &user, group).is_ok());
        assert!(authorize_attachment_read(&admin, &user, group).is_ok());
        assert!(authorize_attachment_read(&other, &user, group).is_err());
    }

    #[test]
    fn test_delete_authorization_matrix() {
        let admin = fixtures::jwt_identity_with_groups("root", &["assistant-admins"]);
        let owner = fixtures::jwt_identity("alice");
        let other = fixtures::jwt_identity("bob");
        let group = "assistant-admins";

        let system = fixtures::system_attachment("sys-1");
        assert!(authorize_attachment_delete(&admin, &system, group).is_ok());
        assert!(authorize_attachment_delete(&owner, &system, group).is_err());

        let user = fixtures::user_attachment("usr-1", "alice");
        assert!(authorize_attachment_delete(&owner, &user, group).is_ok());
        assert!(authorize_attachment_delete(&admin, &user, group).is_ok());
        assert!(authorize_attachment_delete(&other, &user, group).is_err());
    }
}
