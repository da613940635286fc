//! CAPTCHA verification for the login rate-limit bypass.

use axum::http::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, error};

use super::state::AuthState;

#[derive(Debug, Deserialize)]
struct CaptchaVerifyResponse {
    success: bool,
}

/// Decide whether this request is pre-cleared by a CAPTCHA.
///
/// `Ok(true)` only when a token was presented, CAPTCHA is configured, and the
/// verification endpoint confirms it. A presented-but-invalid token fails the
/// request with 400 rather than silently falling back to the rate limiter.
pub(super) async fn captcha_cleared(
    state: &AuthState,
    token: Option<&str>,
) -> Result<bool, (StatusCode, String)> {
    let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
        return Ok(false);
    };
    let Some(captcha) = state.config().captcha() else {
        debug!("captcha token presented but no captcha secret configured; ignoring");
        return Ok(false);
    };

    let response = state
        .http()
        .post(captcha.verify_url())
        .query(&[
            ("secret", captcha.secret().expose_secret()),
            ("response", token),
        ])
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            error!("CAPTCHA verification request failed: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPTCHA verification error".to_string(),
            ));
        }
    };

    match response.json::<CaptchaVerifyResponse>().await {
        Ok(body) if body.success => Ok(true),
        Ok(_) => Err((
            StatusCode::BAD_REQUEST,
            "CAPTCHA verification failed".to_string(),
        )),
        Err(err) => {
            error!("CAPTCHA verification response malformed: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPTCHA verification error".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogMailer;
    use crate::api::handlers::auth::{rate_limit::NoopRateLimiter, state::AuthConfig};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn state_without_captcha() -> AuthState {
        let config = AuthConfig::new(
            SecretString::from("access".to_string()),
            SecretString::from("refresh".to_string()),
        );
        AuthState::new(config, Arc::new(NoopRateLimiter), Arc::new(LogMailer))
    }

    #[tokio::test]
    async fn missing_token_is_not_cleared() {
        let state = state_without_captcha();
        assert_eq!(captcha_cleared(&state, None).await, Ok(false));
    }

    #[tokio::test]
    async fn blank_token_is_not_cleared() {
        let state = state_without_captcha();
        assert_eq!(captcha_cleared(&state, Some("  ")).await, Ok(false));
    }

    #[tokio::test]
    async fn token_without_configured_secret_is_ignored() {
        let state = state_without_captcha();
        assert_eq!(captcha_cleared(&state, Some("token")).await, Ok(false));
    }
}
