//! Refresh-token rotation and logout over the persisted session set.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    state::{AuthConfig, AuthState},
    storage::{refresh_session_active, revoke_refresh_session},
    tokens,
    types::{RefreshRequest, RefreshResponse},
    utils::{extract_client_ip, extract_cookie, extract_user_agent, hash_token, REFRESH_COOKIE_NAME},
};
use crate::api::handlers::activity::log_activity;

/// Build the `HttpOnly` strict cookie carrying the refresh token.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.refresh_token_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_refresh_token(headers: &HeaderMap, body_token: Option<&str>) -> Option<String> {
    body_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .or_else(|| extract_cookie(headers, REFRESH_COOKIE_NAME))
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh-token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 401, description = "No refresh token presented", body = String),
        (status = 403, description = "Refresh token revoked, unknown, or invalid", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let body_token = payload
        .as_ref()
        .and_then(|json| json.refresh_token.as_deref());
    let Some(token) = extract_refresh_token(&headers, body_token) else {
        return (
            StatusCode::UNAUTHORIZED,
            "Unauthorized: no refresh token provided".to_string(),
        )
            .into_response();
    };

    // Signature and expiry first; only then consult the active set.
    let claims = match tokens::verify(auth_state.config().refresh_token_secret(), &token) {
        Ok(claims) => claims,
        Err(_) => {
            return (
                StatusCode::FORBIDDEN,
                "Invalid or expired refresh token".to_string(),
            )
                .into_response();
        }
    };

    let token_hash = hash_token(&token);
    match refresh_session_active(&pool, &token_hash).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::FORBIDDEN,
                "Refresh token is not active".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to check refresh session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Token refresh failed".to_string(),
            )
                .into_response();
        }
    }

    // Mint from the verified payload without touching the credential store:
    // role changes surface on the next authenticated request, not here.
    let access_token = match tokens::sign(
        auth_state.config().access_token_secret(),
        claims.sub,
        &claims.username,
        claims.role,
        &claims.email,
        auth_state.config().access_token_ttl_seconds(),
    ) {
        Ok(access_token) => access_token,
        Err(err) => {
            error!("Failed to sign access token: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Token refresh failed".to_string(),
            )
                .into_response();
        }
    };

    (StatusCode::OK, Json(RefreshResponse { access_token })).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked and cookie cleared"),
        (status = 401, description = "No refresh token presented", body = String),
        (status = 403, description = "Refresh token already revoked or unknown", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let body_token = payload
        .as_ref()
        .and_then(|json| json.refresh_token.as_deref());
    let Some(token) = extract_refresh_token(&headers, body_token) else {
        return (
            StatusCode::UNAUTHORIZED,
            "Unauthorized: no refresh token provided".to_string(),
        )
            .into_response();
    };

    let token_hash = hash_token(&token);
    let revoked = match revoke_refresh_session(&pool, &token_hash).await {
        Ok(revoked) => revoked,
        Err(err) => {
            error!("Failed to revoke refresh session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Logout failed".to_string(),
            )
                .into_response();
        }
    };

    if !revoked {
        // Second logout on the same token: safe, but signalled.
        return (
            StatusCode::FORBIDDEN,
            "Refresh token is not active".to_string(),
        )
            .into_response();
    }

    let actor = tokens::verify(auth_state.config().refresh_token_secret(), &token)
        .ok()
        .map(|claims| claims.sub);
    log_activity(
        &pool,
        actor,
        "User Logout",
        json!({}),
        extract_client_ip(&headers).as_deref(),
        extract_user_agent(&headers).as_deref(),
    )
    .await;

    // Always clear the cookie on a successful revocation.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(secure: bool) -> AuthConfig {
        AuthConfig::new(
            SecretString::from("access".to_string()),
            SecretString::from("refresh".to_string()),
        )
        .with_secure_cookies(secure)
    }

    #[test]
    fn refresh_cookie_is_httponly_and_strict() {
        let cookie = refresh_cookie(&config(false), "token-value");
        let value = cookie.ok().and_then(|v| v.to_str().ok().map(str::to_string));
        let value = value.unwrap_or_default();
        assert!(value.starts_with("vendejo_refresh=token-value"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn refresh_cookie_marks_secure_when_configured() {
        let cookie = refresh_cookie(&config(true), "token-value");
        let value = cookie.ok().and_then(|v| v.to_str().ok().map(str::to_string));
        assert!(value.unwrap_or_default().contains("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(&config(false));
        let value = cookie.ok().and_then(|v| v.to_str().ok().map(str::to_string));
        assert!(value.unwrap_or_default().contains("Max-Age=0"));
    }

    #[test]
    fn refresh_token_prefers_body_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("vendejo_refresh=cookie-token"),
        );
        assert_eq!(
            extract_refresh_token(&headers, Some("body-token")),
            Some("body-token".to_string())
        );
        assert_eq!(
            extract_refresh_token(&headers, None),
            Some("cookie-token".to_string())
        );
        assert_eq!(
            extract_refresh_token(&headers, Some("  ")),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn refresh_token_none_when_absent() {
        let headers = HeaderMap::new();
        assert_eq!(extract_refresh_token(&headers, None), None);
    }
}
