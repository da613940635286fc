//! Current-user endpoint: the caller's profile with the re-resolved role.

use axum::{
    extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::{
    require_auth,
    types::{CurrentUserResponse, IdentityProfile},
    AuthState,
};
use crate::api::handlers::auth::storage::lookup_identity;

#[utoipa::path(
    get,
    path = "/v1/auth/currentuser",
    responses(
        (status = 200, description = "Caller profile and role", body = CurrentUserResponse),
        (status = 401, description = "Missing or invalid access token", body = String)
    ),
    tag = "auth"
)]
pub async fn current_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err((status, message)) => return (status, message).into_response(),
    };

    let identity = match lookup_identity(&pool, principal.identity_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "User not found".to_string()).into_response();
        }
        Err(err) => {
            error!("Identity lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load profile".to_string(),
            )
                .into_response();
        }
    };

    let response = CurrentUserResponse {
        profile: IdentityProfile {
            id: identity.id,
            name: identity.name,
            age: identity.age,
            email: identity.email,
            phone: identity.phone,
            image: identity.image,
            created_at: identity.created_at,
        },
        username: principal.username,
        role: principal.role,
    };

    (StatusCode::OK, Json(response)).into_response()
}
