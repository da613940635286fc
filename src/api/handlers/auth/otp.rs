//! OTP password recovery: request, verify, reset.
//!
//! Verify does not consume the OTP row; it attaches a short-lived reset
//! ticket instead, and reset requires that ticket. A reset call that never
//! went through verify therefore cannot overwrite a password.

use axum::{
    extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use validator::Validate;

use super::{
    state::AuthState,
    storage,
    types::{OtpRequest, OtpVerifyRequest, OtpVerifyResponse, ResetPasswordRequest},
    utils::{
        extract_client_ip, extract_user_agent, generate_otp_code, generate_reset_ticket,
        hash_token, normalize_email,
    },
};
use crate::api::handlers::activity::log_activity;

#[utoipa::path(
    post,
    path = "/v1/auth/request-otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "OTP generated and dispatched", body = String),
        (status = 404, description = "No identity owns this email", body = String),
        (status = 422, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn request_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OtpRequest>>,
) -> impl IntoResponse {
    let request: OtpRequest = match payload {
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

    let email = normalize_email(&request.email);
    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    let identity = match storage::lookup_identity_by_email(&pool, &email).await {
        Ok(identity) => identity,
        Err(err) => {
            error!("OTP identity lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "OTP request failed".to_string(),
            )
                .into_response();
        }
    };

    let Some(identity) = identity else {
        log_activity(
            &pool,
            None,
            "Failed OTP Request",
            json!({ "email": email }),
            client_ip.as_deref(),
            user_agent.as_deref(),
        )
        .await;
        return (
            StatusCode::NOT_FOUND,
            "No account with that email".to_string(),
        )
            .into_response();
    };

    // A new request overwrites any previous code: last write wins.
    let code = generate_otp_code();
    if let Err(err) = storage::upsert_otp(
        &pool,
        &email,
        identity.id,
        &hash_token(&code),
        auth_state.config().otp_ttl_seconds(),
    )
    .await
    {
        error!("Failed to store OTP: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "OTP request failed".to_string(),
        )
            .into_response();
    }

    // Mail dispatch is awaited; a failed send fails the request so the
    // caller knows no code is on the way.
    if let Err(err) = auth_state.mailer().send_code(&email, &code) {
        error!("OTP mail dispatch failed: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Unable to send verification email".to_string(),
        )
            .into_response();
    }

    log_activity(
        &pool,
        Some(identity.id),
        "OTP Requested",
        json!({ "email": email }),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await;

    (StatusCode::OK, "OTP sent to your email".to_string()).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "OTP verified; reset ticket issued", body = OtpVerifyResponse),
        (status = 400, description = "Wrong code or expired OTP", body = String),
        (status = 422, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OtpVerifyRequest>>,
) -> impl IntoResponse {
    let request: OtpVerifyRequest = match payload {
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

    let email = normalize_email(&request.email);
    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    let ticket = match generate_reset_ticket() {
        Ok(ticket) => ticket,
        Err(err) => {
            error!("Reset ticket generation failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "OTP verification failed".to_string(),
            )
                .into_response();
        }
    };

    let verified = storage::verify_otp_and_issue_ticket(
        &pool,
        &email,
        &hash_token(&request.otp),
        &hash_token(&ticket),
        auth_state.config().reset_ticket_ttl_seconds(),
    )
    .await;

    let identity_id = match verified {
        Ok(Some(identity_id)) => identity_id,
        Ok(None) => {
            // Audited for abuse analysis; short-lived codes only.
            log_activity(
                &pool,
                None,
                "Failed OTP Verification",
                json!({ "email": email, "attempted_code": request.otp }),
                client_ip.as_deref(),
                user_agent.as_deref(),
            )
            .await;
            return (
                StatusCode::BAD_REQUEST,
                "Invalid or expired OTP".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("OTP verification failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "OTP verification failed".to_string(),
            )
                .into_response();
        }
    };

    log_activity(
        &pool,
        Some(identity_id),
        "OTP Verified",
        json!({ "email": email }),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await;

    (
        StatusCode::OK,
        Json(OtpVerifyResponse {
            message: "OTP verified successfully".to_string(),
            user_id: identity_id,
            reset_ticket: ticket,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password overwritten", body = String),
        (status = 403, description = "Missing, expired, or already-used reset ticket", body = String),
        (status = 422, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
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

    let email = normalize_email(&request.email);
    let client_ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    let new_password_hash = match bcrypt::hash(&request.new_password, bcrypt::DEFAULT_COST) {
        Ok(new_password_hash) => new_password_hash,
        Err(err) => {
            error!("Password hashing failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response();
        }
    };

    // The ticket is consumed and the hash overwritten in one transaction;
    // the OTP row is gone afterwards, so the deletion is idempotent.
    let reset = storage::reset_password_with_ticket(
        &pool,
        &email,
        &hash_token(&request.reset_ticket),
        &new_password_hash,
    )
    .await;

    let identity_id = match reset {
        Ok(Some(identity_id)) => identity_id,
        Ok(None) => {
            return (
                StatusCode::FORBIDDEN,
                "Invalid or expired reset ticket".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Password reset failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response();
        }
    };

    log_activity(
        &pool,
        Some(identity_id),
        "Password Reset",
        json!({ "email": email }),
        client_ip.as_deref(),
        user_agent.as_deref(),
    )
    .await;

    (StatusCode::OK, "Password reset successfully".to_string()).into_response()
}
