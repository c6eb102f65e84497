//! Conversation History Endpoints
//!
//! All queries are owner-scoped: a conversation id belonging to another
//! user behaves exactly like an id that does not exist. Listing an unknown
//! conversation's messages is an empty page, deleting it is a 404.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use banter_core::{ConversationSummary, Message};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::IdentityExtractor;
use crate::state::AppState;

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Pagination for GET /conversations. `limit` is clamped to [1, 200].
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct ListConversationsQuery {
    #[serde(default = "default_conversation_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Pagination for GET /conversations/{id}/messages. `limit` is clamped to
/// [1, 1000].
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct ListMessagesQuery {
    #[serde(default = "default_message_limit")]
    pub limit: i64,
}

fn default_conversation_limit() -> i64 {
    50
}

fn default_message_limit() -> i64 {
    200
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /conversations - The caller's conversations, most recent first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/conversations",
    tag = "Conversations",
    params(ListConversationsQuery),
    responses(
        (status = 200, description = "Conversation summaries", body = [ConversationSummary]),
    ),
))]
pub async fn list_conversations(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);
    let summaries = state
        .store
        .list_conversations(&identity.user_id, limit, offset)
        .await?;
    Ok(Json(summaries))
}

/// GET /conversations/{id}/messages - Message history, oldest first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    tag = "Conversations",
    params(
        ("id" = String, Path, description = "Conversation id"),
        ListMessagesQuery,
    ),
    responses(
        (status = 200, description = "Messages in chronological order", body = [Message]),
    ),
))]
pub async fn list_messages(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Path(conversation_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let limit = query.limit.clamp(1, 1000);
    // Unknown or foreign ids come back empty rather than erroring, so the
    // endpoint never reveals whether an id exists for someone else.
    let messages = state
        .store
        .list_messages(&identity.user_id, &conversation_id, limit)
        .await?;
    Ok(Json(messages))
}

/// DELETE /conversations/{id} - Delete an owned conversation and its messages
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/conversations/{id}",
    tag = "Conversations",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation deleted"),
        (status = 404, description = "Not found or not owned by the caller"),
    ),
))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .store
        .delete_conversation(&identity.user_id, &conversation_id)
        .await?;
    if !deleted {
        return Err(ApiError::conversation_not_found(&conversation_id));
    }
    Ok(Json(json!({ "deleted": true })))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create conversation router (requires auth middleware)
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_conversations))
        .route("/:id", delete(delete_conversation))
        .route("/:id/messages", get(list_messages))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use banter_core::MessageRole;
    use banter_test_utils::fixtures::trusted_identity;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::{AuthConfig, IdentityResolver};
    use crate::config::FilesConfig;
    use crate::oidc::{FixedClock, HttpKeyFetcher, KeyCache};
    use banter_llm::{MockChatProvider, MockIngestor, MockRetriever, MockVisionProvider};
    use banter_storage::{ChatStore, MemoryFileStore, MemoryStore};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn test_state() -> AppState {
        let config = AuthConfig::default();
        let fetcher = Arc::new(HttpKeyFetcher::new(Duration::from_secs(1)).unwrap());
        let keys = KeyCache::new(fetcher, Arc::new(FixedClock::new()), config.key_ttl, None);
        AppState {
            store: Arc::new(MemoryStore::new()),
            files: Arc::new(MemoryFileStore::new()),
            chat: Arc::new(MockChatProvider::new("ok")),
            vision: Arc::new(MockVisionProvider::new("a chart")),
            retriever: Arc::new(MockRetriever::new(Vec::new())),
            ingestor: Arc::new(MockIngestor::new()),
            resolver: Arc::new(IdentityResolver::new(config, keys)),
            files_config: FilesConfig::default(),
            start_time: Instant::now(),
        }
    }

    fn get_request(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .extension(trusted_identity(user))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_conversations_scoped_to_caller() {
        let state = test_state();
        state
            .store
            .get_or_create_conversation("alice", Some("c-alice"))
            .await
            .unwrap();
        state
            .store
            .get_or_create_conversation("bob", Some("c-bob"))
            .await
            .unwrap();

        let response = create_router(state)
            .oneshot(get_request("/", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["conversation_id"], "c-alice");
    }

    #[tokio::test]
    async fn test_list_conversations_limit_is_clamped() {
        let state = test_state();
        for i in 0..3 {
            state
                .store
                .get_or_create_conversation("alice", Some(&format!("c-{}", i)))
                .await
                .unwrap();
        }

        // limit=0 clamps to 1.
        let response = create_router(state)
            .oneshot(get_request("/?limit=0", "alice"))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_messages_unknown_conversation_is_empty() {
        let state = test_state();
        let response = create_router(state)
            .oneshot(get_request("/never-created/messages", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_messages_foreign_conversation_is_empty() {
        let state = test_state();
        state
            .store
            .get_or_create_conversation("alice", Some("c-1"))
            .await
            .unwrap();
        state
            .store
            .append_message("alice", "c-1", MessageRole::User, "hello")
            .await
            .unwrap();

        let response = create_router(state)
            .oneshot(get_request("/c-1/messages", "bob"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_delete_owned_conversation() {
        let state = test_state();
        state
            .store
            .get_or_create_conversation("alice", Some("c-1"))
            .await
            .unwrap();

        let request = Request::builder()
            .method("DELETE")
            .uri("/c-1")
            .extension(trusted_identity("alice"))
            .body(Body::empty())
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"deleted": true}));
        assert!(state
            .store
            .list_conversations("alice", 10, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_foreign_conversation_is_not_found() {
        let state = test_state();
        state
            .store
            .get_or_create_conversation("alice", Some("c-1"))
            .await
            .unwrap();

        let request = Request::builder()
            .method("DELETE")
            .uri("/c-1")
            .extension(trusted_identity("bob"))
            .body(Body::empty())
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
