//! Access and refresh token issuance and verification.
//!
//! Both token kinds carry the same claim shape and are signed with HS256
//! under separate secrets, so one can never stand in for the other. Access
//! tokens are stateless; refresh tokens are additionally checked against the
//! `refresh_sessions` table by the refresh/logout handlers.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::Role;

/// Claims embedded in every token. The role claim is a snapshot taken at
/// issuance; authenticated requests re-resolve it from the credential row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn new(identity_id: Uuid, username: &str, role: Role, email: &str, ttl_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: identity_id,
            username: username.to_string(),
            role,
            email: email.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

#[derive(Debug)]
pub(super) struct TokenPair {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
}

pub(super) fn sign(
    secret: &SecretString,
    identity_id: Uuid,
    username: &str,
    role: Role,
    email: &str,
    ttl_seconds: i64,
) -> Result<String> {
    let claims = Claims::new(identity_id, username, role, email, ttl_seconds);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .context("failed to sign token")
}

pub(super) fn verify(secret: &SecretString, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .context("token verification failed")?;
    Ok(data.claims)
}

/// Issue a fresh access+refresh pair from live credential data.
pub(super) fn issue_pair(
    config: &super::state::AuthConfig,
    identity_id: Uuid,
    username: &str,
    role: Role,
    email: &str,
) -> Result<TokenPair> {
    let access_token = sign(
        config.access_token_secret(),
        identity_id,
        username,
        role,
        email,
        config.access_token_ttl_seconds(),
    )?;
    let refresh_token = sign(
        config.refresh_token_secret(),
        identity_id,
        username,
        role,
        email,
        config.refresh_token_ttl_seconds(),
    )?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<()> {
        let key = secret("access-secret");
        let identity_id = Uuid::new_v4();
        let token = sign(
            &key,
            identity_id,
            "alice",
            Role::Customer,
            "alice@example.com",
            900,
        )?;

        let claims = verify(&key, &token)?;
        assert_eq!(claims.sub, identity_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.exp - claims.iat, 900);
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_secret() -> Result<()> {
        let token = sign(
            &secret("access-secret"),
            Uuid::new_v4(),
            "alice",
            Role::Customer,
            "alice@example.com",
            900,
        )?;
        assert!(verify(&secret("other-secret"), &token).is_err());
        Ok(())
    }

    #[test]
    fn verify_rejects_expired_token() -> Result<()> {
        let key = secret("access-secret");
        // Expired two minutes ago, beyond the default leeway.
        let token = sign(
            &key,
            Uuid::new_v4(),
            "alice",
            Role::Customer,
            "alice@example.com",
            -120,
        )?;
        assert!(verify(&key, &token).is_err());
        Ok(())
    }

    #[test]
    fn verify_rejects_tampered_token() -> Result<()> {
        let key = secret("access-secret");
        let token = sign(
            &key,
            Uuid::new_v4(),
            "alice",
            Role::Customer,
            "alice@example.com",
            900,
        )?;
        let mut tampered = token.clone();
        tampered.pop();
        assert!(verify(&key, &tampered).is_err());
        Ok(())
    }

    #[test]
    fn access_token_does_not_verify_as_refresh() -> Result<()> {
        let config = super::super::state::AuthConfig::new(
            secret("access-secret"),
            secret("refresh-secret"),
        );
        let pair = issue_pair(
            &config,
            Uuid::new_v4(),
            "alice",
            Role::Admin,
            "alice@example.com",
        )?;

        assert!(verify(config.access_token_secret(), &pair.access_token).is_ok());
        assert!(verify(config.refresh_token_secret(), &pair.access_token).is_err());
        assert!(verify(config.refresh_token_secret(), &pair.refresh_token).is_ok());
        assert!(verify(config.access_token_secret(), &pair.refresh_token).is_err());
        Ok(())
    }
}
