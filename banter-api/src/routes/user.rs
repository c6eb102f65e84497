//! Current-User Endpoint
//!
//! Projects the resolved identity into the profile shape clients render.

use axum::{extract::State, routing::get, Json, Router};

use crate::auth::UserInfo;
use crate::middleware::auth::IdentityExtractor;
use crate::state::AppState;

/// GET /user - Profile of the authenticated caller
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/user",
    tag = "User",
    responses(
        (status = 200, description = "Resolved user profile", body = UserInfo),
        (status = 401, description = "No usable identity"),
    ),
))]
pub async fn current_user(
    State(state): State<AppState>,
    IdentityExtractor(identity): IdentityExtractor,
) -> Json<UserInfo> {
    Json(UserInfo::from_identity(&identity, state.admin_group()))
}

/// Create user router (requires auth middleware)
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(current_user))
        .with_state(state)
}
