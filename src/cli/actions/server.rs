use crate::api::{
    self,
    handlers::auth::{AuthConfig, CaptchaConfig},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub otp_ttl_seconds: i64,
    pub captcha_secret: Option<SecretString>,
    pub captcha_verify_url: String,
    pub secure_cookies: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let captcha = match args.captcha_secret {
        Some(secret) => {
            // Fail fast on an unusable endpoint instead of per-request.
            Url::parse(&args.captcha_verify_url).with_context(|| {
                format!("Invalid CAPTCHA verify URL: {}", args.captcha_verify_url)
            })?;
            Some(CaptchaConfig::new(secret, args.captcha_verify_url))
        }
        None => None,
    };

    let auth_config = AuthConfig::new(args.access_token_secret, args.refresh_token_secret)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_secure_cookies(args.secure_cookies)
        .with_captcha(captcha);

    api::new(args.port, args.dsn, auth_config).await
}
