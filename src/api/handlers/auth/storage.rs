//! Database helpers for identities, credentials, refresh sessions, and OTPs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::Role;
use super::utils::is_unique_violation;

/// Outcome when attempting to create a new identity + credential pair.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created {
        identity_id: Uuid,
        created_at: DateTime<Utc>,
    },
    Conflict,
}

/// Outcome for a profile update that may collide with unique contact fields.
#[derive(Debug)]
pub(crate) enum UpdateOutcome {
    Updated(IdentityRecord),
    Conflict,
    NotFound,
}

/// Login credential as stored; the role here is authoritative.
pub(crate) struct CredentialRecord {
    pub(crate) identity_id: Uuid,
    pub(crate) username: String,
    pub(crate) password_hash: String,
    pub(crate) role: Role,
}

#[derive(Debug)]
pub(crate) struct IdentityRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) age: i32,
    pub(crate) email: String,
    pub(crate) phone: String,
    pub(crate) image: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

fn identity_from_row(row: &sqlx::postgres::PgRow) -> IdentityRecord {
    IdentityRecord {
        id: row.get("id"),
        name: row.get("name"),
        age: row.get("age"),
        email: row.get("email"),
        phone: row.get("phone"),
        image: row.get("image"),
        created_at: row.get("created_at"),
    }
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> CredentialRecord {
    let role: String = row.get("role");
    CredentialRecord {
        identity_id: row.get("identity_id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: Role::from_db(&role),
    }
}

/// Advisory duplicate check for fast 409 feedback; the unique constraints
/// inside the registration transaction remain the source of truth.
pub(super) async fn contact_taken(pool: &PgPool, email: &str, phone: &str) -> Result<bool> {
    let query = "SELECT EXISTS(SELECT 1 FROM identities WHERE email = $1 OR phone = $2) AS taken";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(phone)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check for existing contact")?;
    Ok(row.get("taken"))
}

pub(super) async fn username_taken(pool: &PgPool, username: &str) -> Result<bool> {
    let query = "SELECT EXISTS(SELECT 1 FROM credentials WHERE username = $1) AS taken";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check for existing username")?;
    Ok(row.get("taken"))
}

/// Create an identity and its credential in one transaction: both rows exist
/// afterwards or neither does. The role is always `customer` at creation.
pub(super) async fn insert_identity_and_credential(
    pool: &PgPool,
    name: &str,
    age: i32,
    email: &str,
    phone: &str,
    image: Option<&str>,
    username: &str,
    password_hash: &str,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin registration transaction")?;

    let query = r"
        INSERT INTO identities (name, age, email, phone, image)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(age)
        .bind(email)
        .bind(phone)
        .bind(image)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let (identity_id, created_at): (Uuid, DateTime<Utc>) = match row {
        Ok(row) => (row.get("id"), row.get("created_at")),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::Conflict);
            }
            return Err(err).context("failed to insert identity");
        }
    };

    let query = r"
        INSERT INTO credentials (username, password_hash, role, identity_id)
        VALUES ($1, $2, 'customer', $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(username)
        .bind(password_hash)
        .bind(identity_id)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = result {
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(RegisterOutcome::Conflict);
        }
        return Err(err).context("failed to insert credential");
    }

    tx.commit().await.context("commit registration transaction")?;

    Ok(RegisterOutcome::Created {
        identity_id,
        created_at,
    })
}

/// Case-sensitive exact-match lookup used by login.
pub(super) async fn lookup_credential_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CredentialRecord>> {
    let query = r"
        SELECT identity_id, username, password_hash, role
        FROM credentials
        WHERE username = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credential by username")?;
    Ok(row.map(|row| credential_from_row(&row)))
}

/// Lookup used by the authentication middleware to re-resolve the caller's
/// current role on every request.
pub(crate) async fn lookup_credential_by_identity(
    pool: &PgPool,
    identity_id: Uuid,
) -> Result<Option<CredentialRecord>> {
    let query = r"
        SELECT identity_id, username, password_hash, role
        FROM credentials
        WHERE identity_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identity_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credential by identity")?;
    Ok(row.map(|row| credential_from_row(&row)))
}

pub(crate) async fn lookup_identity(
    pool: &PgPool,
    identity_id: Uuid,
) -> Result<Option<IdentityRecord>> {
    let query = r"
        SELECT id, name, age, email, phone, image, created_at
        FROM identities
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identity_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity")?;
    Ok(row.map(|row| identity_from_row(&row)))
}

pub(super) async fn lookup_identity_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<IdentityRecord>> {
    let query = r"
        SELECT id, name, age, email, phone, image, created_at
        FROM identities
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity by email")?;
    Ok(row.map(|row| identity_from_row(&row)))
}

pub(crate) async fn list_identities(pool: &PgPool) -> Result<Vec<IdentityRecord>> {
    let query = r"
        SELECT id, name, age, email, phone, image, created_at
        FROM identities
        ORDER BY created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list identities")?;
    Ok(rows.iter().map(identity_from_row).collect())
}

pub(crate) async fn update_identity(
    pool: &PgPool,
    identity_id: Uuid,
    name: Option<&str>,
    age: Option<i32>,
    phone: Option<&str>,
    image: Option<&str>,
) -> Result<UpdateOutcome> {
    let query = r"
        UPDATE identities
        SET name = COALESCE($2, name),
            age = COALESCE($3, age),
            phone = COALESCE($4, phone),
            image = COALESCE($5, image)
        WHERE id = $1
        RETURNING id, name, age, email, phone, image, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identity_id)
        .bind(name)
        .bind(age)
        .bind(phone)
        .bind(image)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(UpdateOutcome::Updated(identity_from_row(&row))),
        Ok(None) => Ok(UpdateOutcome::NotFound),
        Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::Conflict),
        Err(err) => Err(err).context("failed to update identity"),
    }
}

/// Delete an identity; credential, refresh sessions, and OTP rows cascade.
pub(crate) async fn delete_identity(pool: &PgPool, identity_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM identities WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(identity_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete identity")?;
    Ok(result.rows_affected() > 0)
}

/// Record a freshly issued refresh token as active. Only its hash is stored.
pub(super) async fn insert_refresh_session(
    pool: &PgPool,
    identity_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_sessions (identity_id, token_hash, user_agent, ip, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(identity_id)
        .bind(token_hash)
        .bind(user_agent)
        .bind(ip)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert refresh session")?;
    Ok(())
}

/// A refresh token absent from the active set is rejected even when its
/// signature is valid.
pub(super) async fn refresh_session_active(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM refresh_sessions
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
        ) AS active
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check refresh session")?;
    Ok(row.get("active"))
}

/// Revoke one refresh session. Returns false when the token was unknown or
/// already revoked, so a second logout surfaces as 403 instead of a crash.
pub(super) async fn revoke_refresh_session(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = r"
        UPDATE refresh_sessions
        SET revoked_at = NOW()
        WHERE token_hash = $1
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke refresh session")?;
    Ok(result.rows_affected() > 0)
}

/// Store a new OTP for the email, replacing any previous one
/// (last-write-wins) and clearing any outstanding reset ticket.
pub(super) async fn upsert_otp(
    pool: &PgPool,
    email: &str,
    identity_id: Uuid,
    code_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_otps (email, identity_id, code_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ON CONFLICT (email) DO UPDATE
        SET identity_id = EXCLUDED.identity_id,
            code_hash = EXCLUDED.code_hash,
            expires_at = EXCLUDED.expires_at,
            reset_ticket_hash = NULL,
            reset_ticket_expires_at = NULL,
            created_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(identity_id)
        .bind(code_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert otp")?;
    Ok(())
}

/// Validate an OTP and, if it matches and is unexpired, attach a reset
/// ticket to the row in the same statement. The OTP row itself survives
/// until the reset completes.
pub(super) async fn verify_otp_and_issue_ticket(
    pool: &PgPool,
    email: &str,
    code_hash: &[u8],
    ticket_hash: &[u8],
    ticket_ttl_seconds: i64,
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE password_reset_otps
        SET reset_ticket_hash = $3,
            reset_ticket_expires_at = NOW() + ($4 * INTERVAL '1 second')
        WHERE email = $1
          AND code_hash = $2
          AND expires_at > NOW()
        RETURNING identity_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code_hash)
        .bind(ticket_hash)
        .bind(ticket_ttl_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to verify otp")?;
    Ok(row.map(|row| row.get("identity_id")))
}

/// Consume a verified reset ticket and overwrite the credential's password
/// hash in one transaction. Returns the identity whose password changed, or
/// `None` when the ticket was missing, expired, or already used.
pub(super) async fn reset_password_with_ticket(
    pool: &PgPool,
    email: &str,
    ticket_hash: &[u8],
    new_password_hash: &str,
) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await.context("begin password reset transaction")?;

    let query = r"
        DELETE FROM password_reset_otps
        WHERE email = $1
          AND reset_ticket_hash = $2
          AND reset_ticket_expires_at > NOW()
        RETURNING identity_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(ticket_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume reset ticket")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reset noop")?;
        return Ok(None);
    };

    let identity_id: Uuid = row.get("identity_id");
    let query = r"
        UPDATE credentials
        SET password_hash = $2
        WHERE identity_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(identity_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    tx.commit().await.context("commit password reset transaction")?;

    Ok(Some(identity_id))
}

#[cfg(test)]
mod tests {
    use super::{CredentialRecord, RegisterOutcome, UpdateOutcome};
    use crate::api::handlers::auth::types::Role;
    use uuid::Uuid;

    #[test]
    fn register_outcome_debug_names() {
        let created = RegisterOutcome::Created {
            identity_id: Uuid::nil(),
            created_at: chrono::Utc::now(),
        };
        assert!(format!("{created:?}").starts_with("Created"));
        assert_eq!(format!("{:?}", RegisterOutcome::Conflict), "Conflict");
    }

    #[test]
    fn update_outcome_debug_names() {
        assert_eq!(format!("{:?}", UpdateOutcome::Conflict), "Conflict");
        assert_eq!(format!("{:?}", UpdateOutcome::NotFound), "NotFound");
    }

    #[test]
    fn credential_record_holds_values() {
        let record = CredentialRecord {
            identity_id: Uuid::nil(),
            username: "alice".to_string(),
            password_hash: "$2b$12$hash".to_string(),
            role: Role::Customer,
        };
        assert_eq!(record.identity_id, Uuid::nil());
        assert_eq!(record.username, "alice");
        assert_eq!(record.role, Role::Customer);
    }
}
