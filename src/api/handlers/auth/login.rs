//! Credential login: dual rate limits, CAPTCHA bypass, bcrypt verification,
//! token issuance from live credential + identity rows.

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
    captcha::captcha_cleared,
    rate_limit::RateLimitDecision,
    refresh::refresh_cookie,
    state::AuthState,
    storage, tokens,
    types::{LoginRequest, LoginResponse},
    utils::{extract_client_ip, extract_user_agent, hash_token},
};
use crate::api::handlers::activity::log_activity;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Password mismatch", body = String),
        (status = 404, description = "Unknown username", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(errors) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Validation error", "errors": errors })),
        )
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);
    let username = request.username.trim().to_string();

    // A verified CAPTCHA pre-clears the address limiter for this request
    // only; the per-username limiter still applies.
    let cleared = match captcha_cleared(&auth_state, request.captcha_token.as_deref()).await {
        Ok(cleared) => cleared,
        Err((status, message)) => return (status, message).into_response(),
    };

    if !cleared
        && auth_state.rate_limiter().check_ip(client_ip.as_deref()) == RateLimitDecision::Limited
    {
        log_activity(
            &pool,
            None,
            "Rate Limit Exceeded",
            json!({ "ip": client_ip, "path": "/v1/auth/login" }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many attempts. Please solve the CAPTCHA and retry.".to_string(),
        )
            .into_response();
    }

    if auth_state
        .rate_limiter()
        .check_credentials(client_ip.as_deref(), &username)
        == RateLimitDecision::Limited
    {
        log_activity(
            &pool,
            None,
            "Login Rate Limit Exceeded",
            json!({ "ip": client_ip, "username": username }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts. Please wait 10 minutes and try again.".to_string(),
        )
            .into_response();
    }

    // Case-sensitive exact match; the attempted username is audited on
    // failure, the password never is.
    let credential = match storage::lookup_credential_by_username(&pool, &username).await {
        Ok(credential) => credential,
        Err(err) => {
            error!("Credential lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    let Some(credential) = credential else {
        log_activity(
            &pool,
            None,
            "Failed Login Attempt",
            json!({ "username": username, "reason": "unknown username" }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (StatusCode::NOT_FOUND, "User not found".to_string()).into_response();
    };

    let password_matches =
        bcrypt::verify(&request.password, &credential.password_hash).unwrap_or(false);
    if !password_matches {
        log_activity(
            &pool,
            None,
            "Failed Login Attempt",
            json!({ "username": username, "reason": "password mismatch" }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response();
    }

    // Token payload is built from live rows, never from a prior token.
    let identity = match storage::lookup_identity(&pool, credential.identity_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            error!(
                "Credential {} has no identity row",
                credential.identity_id
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Identity lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    let pair = match tokens::issue_pair(
        auth_state.config(),
        credential.identity_id,
        &credential.username,
        credential.role,
        &identity.email,
    ) {
        Ok(pair) => pair,
        Err(err) => {
            error!("Token issuance failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    if let Err(err) = storage::insert_refresh_session(
        &pool,
        credential.identity_id,
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
            "Login failed".to_string(),
        )
            .into_response();
    }

    log_activity(
        &pool,
        Some(credential.identity_id),
        "User Login",
        json!({ "username": credential.username }),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = refresh_cookie(auth_state.config(), &pair.refresh_token) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let response = LoginResponse {
        message: "Login successful".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        role: credential.role,
        user_id: credential.identity_id,
        username: credential.username,
    };

    (StatusCode::OK, response_headers, Json(response)).into_response()
}
