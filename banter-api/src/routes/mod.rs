//! HTTP Route Modules
//!
//! Assembles the full router: identity-protected business routes, open
//! health endpoints, and the OpenAPI surface when the features are on.

pub mod attachment;
pub mod chat;
pub mod conversation;
pub mod health;
pub mod user;

use axum::http::HeaderValue;
use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::auth::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

/// Build the CORS layer from the configured origins.
///
/// No origins means development mode: allow everything. Configured origins
/// are parsed strictly; an unparsable origin is dropped with a warning
/// rather than silently widening access.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "skipping unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// GET /openapi.json - The OpenAPI document
#[cfg(feature = "openapi")]
pub async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

/// Create the complete application router.
///
/// Business routes sit behind the identity middleware; health and the
/// OpenAPI document stay open so probes and tooling need no credentials.
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    let cors = build_cors_layer(&api_config.cors_origins);
    let auth_state = AuthMiddlewareState::new(state.resolver.clone());

    let protected = Router::new()
        .nest("/chat", chat::create_router(state.clone()))
        .nest("/conversations", conversation::create_router(state.clone()))
        .nest("/attachments", attachment::create_router(state.clone()))
        .nest("/user", user::create_router(state.clone()))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let router = Router::new()
        .merge(protected)
        .nest("/health", health::create_router(state));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", axum::routing::get(openapi_json));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", crate::openapi::ApiDoc::openapi()),
        )
    };

    router.layer(TraceLayer::new_for_http()).layer(cors)
}
