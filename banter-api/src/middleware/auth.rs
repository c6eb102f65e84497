//! Axum Middleware for Identity Resolution
//!
//! This middleware:
//! - Resolves the caller identity on every request via the strategy chain
//! - Injects the resolved [`UserIdentity`] into request extensions
//! - Returns 401 when no strategy yields an identity
//!
//! Handlers receive the identity through the [`IdentityExtractor`], which
//! makes authentication a compile-time requirement of the handler signature.

use crate::auth::IdentityResolver;
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use banter_core::UserIdentity;
use std::sync::Arc;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the identity middleware, passed via Axum's State
/// extractor.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub resolver: Arc<IdentityResolver>,
}

impl AuthMiddlewareState {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        Self { resolver }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Resolve the caller identity and make it available to handlers.
///
/// ```ignore
/// use axum::{Router, middleware};
/// use banter_api::middleware::{auth_middleware, AuthMiddlewareState};
///
/// let app = Router::new()
///     .route("/user", axum::routing::get(|| async { "OK" }))
///     .layer(middleware::from_fn_with_state(auth_state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let identity = state
        .resolver
        .resolve(request.headers())
        .await
        .map_err(|e| AuthMiddlewareError(e.into()))?;

    tracing::debug!(
        user_id = %identity.user_id,
        trust_source = identity.trust_source.as_str(),
        "identity resolved"
    );

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed Axum extractor for the resolved identity.
///
/// Requires `auth_middleware` on the route; without it the extractor
/// rejects with a 500 rather than silently passing an anonymous request.
#[derive(Debug, Clone)]
pub struct IdentityExtractor(pub UserIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdentityExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserIdentity>()
            .cloned()
            .map(IdentityExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "UserIdentity not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for IdentityExtractor {
    type Target = UserIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, TRUSTED_USER_HEADER};
    use crate::oidc::{FixedClock, HttpKeyFetcher, KeyCache};
    use axum::http::StatusCode;
    use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn header_trust_state() -> AuthMiddlewareState {
        let config = AuthConfig {
            trust_proxy_headers: true,
            jwks_url: None,
            issuer: None,
            audience: None,
            ..AuthConfig::default()
        };
        // The HTTP fetcher is never reached: no bearer tokens in these tests.
        let fetcher = Arc::new(HttpKeyFetcher::new(Duration::from_secs(1)).unwrap());
        let keys = KeyCache::new(fetcher, Arc::new(FixedClock::new()), config.key_ttl, None);
        AuthMiddlewareState::new(Arc::new(IdentityResolver::new(config, keys)))
    }

    async fn whoami(IdentityExtractor(identity): IdentityExtractor) -> Json<String> {
        Json(identity.user_id)
    }

    fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn_with_state(header_trust_state(), auth_middleware))
    }

    #[tokio::test]
    async fn test_trusted_headers_pass_through_middleware() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .header(TRUSTED_USER_HEADER, "alice")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_identity_is_401() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_500() {
        let bare = Router::new().route("/whoami", get(whoami));
        let response = bare
            .oneshot(
                axum::http::Request::builder()
                    .uri("/whoami")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
