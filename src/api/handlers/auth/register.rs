//! Registration: validate, sanitize, create identity + credential
//! atomically, and issue the first token pair.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use validator::Validate;

use super::{
    rate_limit::RateLimitDecision,
    refresh::refresh_cookie,
    state::AuthState,
    storage::{self, RegisterOutcome},
    tokens,
    types::{IdentityProfile, RegisterRequest, RegisterResponse, Role},
    utils::{extract_client_ip, extract_user_agent, hash_token},
};
use crate::api::handlers::activity::log_activity;
use crate::api::sanitize::clean_text;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity and credential created", body = RegisterResponse),
        (status = 409, description = "Username, email, or phone already registered", body = String),
        (status = 422, description = "Validation error", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    if auth_state.rate_limiter().check_ip(client_ip.as_deref()) == RateLimitDecision::Limited {
        log_activity(
            &pool,
            None,
            "Rate Limit Exceeded",
            json!({ "ip": client_ip, "path": "/v1/auth/register" }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many attempts. Please wait 10 minutes and try again.".to_string(),
        )
            .into_response();
    }

    if let Err(errors) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Validation error", "errors": errors })),
        )
            .into_response();
    }

    // Free-text fields are stripped of executable markup before persistence.
    let name = clean_text(request.name.trim());
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    let phone = request.phone.trim().to_string();

    // Advisory pre-check for fast feedback; the unique constraints inside
    // the transaction below remain the source of truth for the race.
    match storage::contact_taken(&pool, &email, &phone).await {
        Ok(true) => {
            return (
                StatusCode::CONFLICT,
                "Email or phone already registered".to_string(),
            )
                .into_response();
        }
        Ok(false) => {}
        Err(err) => {
            error!("Registration pre-check failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    }
    match storage::username_taken(&pool, &username).await {
        Ok(true) => {
            return (StatusCode::CONFLICT, "Username already taken".to_string()).into_response();
        }
        Ok(false) => {}
        Err(err) => {
            error!("Registration pre-check failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    }

    let password_hash = match bcrypt::hash(&request.password, bcrypt::DEFAULT_COST) {
        Ok(password_hash) => password_hash,
        Err(err) => {
            error!("Password hashing failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    // Role is always forced to customer at creation, regardless of payload.
    let outcome = storage::insert_identity_and_credential(
        &pool,
        &name,
        request.age,
        &email,
        &phone,
        request.image.as_deref(),
        &username,
        &password_hash,
    )
    .await;

    let (identity_id, created_at) = match outcome {
        Ok(RegisterOutcome::Created {
            identity_id,
            created_at,
        }) => (identity_id, created_at),
        Ok(RegisterOutcome::Conflict) => {
            return (
                StatusCode::CONFLICT,
                "Username, email, or phone already registered".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Registration failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    let pair = match tokens::issue_pair(
        auth_state.config(),
        identity_id,
        &username,
        Role::Customer,
        &email,
    ) {
        Ok(pair) => pair,
        Err(err) => {
            error!("Token issuance failed after registration: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    if let Err(err) = storage::insert_refresh_session(
        &pool,
        identity_id,
        &hash_token(&pair.refresh_token),
        auth_state.config().refresh_token_ttl_seconds(),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await
    {
        error!("Failed to record refresh session: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Registration failed".to_string(),
        )
            .into_response();
    }

    log_activity(
        &pool,
        Some(identity_id),
        "User Registration",
        json!({ "username": username }),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = refresh_cookie(auth_state.config(), &pair.refresh_token) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let response = RegisterResponse {
        message: "User and credentials created successfully".to_string(),
        user: IdentityProfile {
            id: identity_id,
            name,
            age: request.age,
            email,
            phone,
            image: request.image,
            created_at,
        },
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    (StatusCode::CREATED, response_headers, Json(response)).into_response()
}
