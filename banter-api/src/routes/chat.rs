//! Streaming Chat Endpoint
//!
//! POST /chat runs the retrieval-augmented pipeline and streams the answer
//! back as SSE. Failures before the first event map to an HTTP status via
//! [`ApiError`]; once the stream is open it always terminates with a `done`
//! or `error` event.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{KeepAlive, Sse},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use futures_util::StreamExt;

use crate::error::ApiResult;
use crate::middleware::auth::IdentityExtractor;
use crate::pipeline::{run_chat, ChatRequest};
use crate::state::AppState;

/// POST /chat - Stream a retrieval-augmented answer
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/chat",
    tag = "Chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of protocol events"),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Referenced attachment is not accessible"),
        (status = 404, description = "Referenced attachment does not exist"),
        (status = 500, description = "Retrieval or stream setup failed"),
    ),
))]
pub async fn chat(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let events = run_chat(state, identity, request).await?;
    let stream = events.map(|event| Ok::<_, Infallible>(event.into_sse()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Create chat router (requires auth middleware)
pub fn create_router(state: AppState) -> Router {
    Router::new().route("/", post(chat)).with_state(state)
}
