//! Auth state and configuration shared across handlers.

use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::RateLimiter;
use crate::api::email::OtpMailer;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESET_TICKET_TTL_SECONDS: i64 = 10 * 60;

/// CAPTCHA verification endpoint + secret. Absent config means CAPTCHA
/// tokens are ignored and the address rate limiter is never bypassed.
#[derive(Clone, Debug)]
pub struct CaptchaConfig {
    secret: SecretString,
    verify_url: String,
}

impl CaptchaConfig {
    #[must_use]
    pub fn new(secret: SecretString, verify_url: String) -> Self {
        Self { secret, verify_url }
    }

    pub(super) fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub(super) fn verify_url(&self) -> &str {
        &self.verify_url
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    reset_ticket_ttl_seconds: i64,
    secure_cookies: bool,
    captcha: Option<CaptchaConfig>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(access_token_secret: SecretString, refresh_token_secret: SecretString) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            reset_ticket_ttl_seconds: DEFAULT_RESET_TICKET_TTL_SECONDS,
            secure_cookies: false,
            captcha: None,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ticket_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ticket_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_captcha(mut self, captcha: Option<CaptchaConfig>) -> Self {
        self.captcha = captcha;
        self
    }

    pub(crate) fn access_token_secret(&self) -> &SecretString {
        &self.access_token_secret
    }

    pub(super) fn refresh_token_secret(&self) -> &SecretString {
        &self.refresh_token_secret
    }

    pub(super) fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub(super) fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn reset_ticket_ttl_seconds(&self) -> i64 {
        self.reset_ticket_ttl_seconds
    }

    pub(super) fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    pub(super) fn captcha(&self) -> Option<&CaptchaConfig> {
        self.captcha.as_ref()
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn OtpMailer>,
    http: reqwest::Client,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn OtpMailer>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            mailer,
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn mailer(&self) -> &dyn OtpMailer {
        self.mailer.as_ref()
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogMailer;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use secrecy::ExposeSecret;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(secret("access"), secret("refresh"));

        assert_eq!(
            config.access_token_ttl_seconds(),
            super::DEFAULT_ACCESS_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            super::DEFAULT_REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.reset_ticket_ttl_seconds(),
            super::DEFAULT_RESET_TICKET_TTL_SECONDS
        );
        assert!(!config.secure_cookies());
        assert!(config.captcha().is_none());

        let config = config
            .with_access_token_ttl_seconds(60)
            .with_refresh_token_ttl_seconds(120)
            .with_otp_ttl_seconds(30)
            .with_reset_ticket_ttl_seconds(45)
            .with_secure_cookies(true)
            .with_captcha(Some(CaptchaConfig::new(
                secret("captcha"),
                "https://captcha.test/verify".to_string(),
            )));

        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 120);
        assert_eq!(config.otp_ttl_seconds(), 30);
        assert_eq!(config.reset_ticket_ttl_seconds(), 45);
        assert!(config.secure_cookies());
        let captcha = config.captcha();
        assert!(captcha.is_some());
        if let Some(captcha) = captcha {
            assert_eq!(captcha.verify_url(), "https://captcha.test/verify");
            assert_eq!(captcha.secret().expose_secret(), "captcha");
        }
    }

    #[test]
    fn auth_state_exposes_parts() {
        let config = AuthConfig::new(secret("access"), secret("refresh"));
        let state = AuthState::new(config, Arc::new(NoopRateLimiter), Arc::new(LogMailer));
        assert_eq!(state.config().access_token_secret().expose_secret(), "access");
    }
}
