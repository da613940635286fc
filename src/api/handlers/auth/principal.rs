//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: pull a bearer token from the Authorization header or the
//! access cookie, verify signature and expiry, then re-read the credential
//! row and overwrite the token's role claim with the stored role. The
//! signature is trusted for identity only, never for role.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::state::AuthState;
use super::storage::lookup_credential_by_identity;
use super::tokens;
use super::types::Role;
use super::utils::{extract_bearer_token, extract_cookie, ACCESS_COOKIE_NAME};

/// Authenticated caller context with the present-tense role.
#[derive(Clone, Debug)]
pub struct Principal {
    pub identity_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, ACCESS_COOKIE_NAME))
}

/// Resolve the request's access token into a principal.
///
/// 401 covers every failure here: missing token, bad signature, expiry, and
/// a structurally valid token whose credential no longer exists.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, (StatusCode, String)> {
    let Some(token) = extract_access_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Unauthorized: no token provided".to_string(),
        ));
    };

    let claims = tokens::verify(auth_state.config().access_token_secret(), &token).map_err(
        |_| {
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired access token".to_string(),
            )
        },
    )?;

    let credential = match lookup_credential_by_identity(pool, claims.sub).await {
        Ok(credential) => credential,
        Err(err) => {
            error!("Failed to resolve credential for token: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            ));
        }
    };

    let Some(credential) = credential else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid token: credential not found".to_string(),
        ));
    };

    // The stored role wins over whatever the token was issued with.
    Ok(Principal {
        identity_id: credential.identity_id,
        username: credential.username,
        email: claims.email,
        role: credential.role,
    })
}

/// Role gate composed with `require_auth` on administrative endpoints.
pub fn require_role(principal: &Principal, required: Role) -> Result<(), (StatusCode, String)> {
    if principal.role == required {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "Forbidden: insufficient privileges".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn principal(role: Role) -> Principal {
        Principal {
            identity_id: Uuid::nil(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn require_role_allows_matching_role() {
        assert!(require_role(&principal(Role::Admin), Role::Admin).is_ok());
        assert!(require_role(&principal(Role::Customer), Role::Customer).is_ok());
    }

    #[test]
    fn require_role_rejects_mismatch() {
        let denied = require_role(&principal(Role::Customer), Role::Admin);
        assert_eq!(denied.map_err(|(status, _)| status), Err(StatusCode::FORBIDDEN));
    }

    #[test]
    fn is_admin_reflects_role() {
        assert!(principal(Role::Admin).is_admin());
        assert!(!principal(Role::Customer).is_admin());
    }

    #[test]
    fn access_token_read_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_access_token(&headers), None);

        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("vendejo_token=cookie-token"),
        );
        assert_eq!(
            extract_access_token(&headers),
            Some("cookie-token".to_string())
        );

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(
            extract_access_token(&headers),
            Some("header-token".to_string())
        );
    }
}
