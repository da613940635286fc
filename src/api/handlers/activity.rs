//! Append-only activity log: the audit sink and the admin listing endpoint.
//!
//! Every security-relevant operation records an entry here. Writes are
//! fire-and-forget: a failed audit insert is logged to the operator console
//! and never blocks or fails the primary response.

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::{require_auth, require_role, AuthState, Role};

const LIST_LIMIT: i64 = 100;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append an audit record. Failures are swallowed after logging so that
/// observability never becomes an availability hazard.
pub(crate) async fn log_activity(
    pool: &PgPool,
    actor_id: Option<Uuid>,
    action: &str,
    metadata: Value,
    ip: Option<&str>,
    user_agent: Option<&str>,
) {
    let payload = match serde_json::to_string(&metadata) {
        Ok(payload) => payload,
        Err(err) => {
            error!("Activity metadata serialization failed: {err}");
            return;
        }
    };

    let query = r"
        INSERT INTO activity_logs (actor_id, action, metadata, ip, user_agent)
        VALUES ($1, $2, $3::jsonb, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    if let Err(err) = sqlx::query(query)
        .bind(actor_id)
        .bind(action)
        .bind(payload)
        .bind(ip)
        .bind(user_agent)
        .execute(pool)
        .instrument(span)
        .await
    {
        error!("Activity logging failed: {err}");
    }
}

#[utoipa::path(
    get,
    path = "/v1/activity-logs",
    responses(
        (status = 200, description = "Latest audit records, newest first", body = [ActivityLogEntry]),
        (status = 401, description = "Missing or invalid access token", body = String),
        (status = 403, description = "Caller is not an admin", body = String)
    ),
    tag = "activity"
)]
pub async fn list(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err((status, message)) => return (status, message).into_response(),
    };
    if let Err((status, message)) = require_role(&principal, Role::Admin) {
        return (status, message).into_response();
    }

    let query = r"
        SELECT id, actor_id, action, metadata::text AS metadata, ip, user_agent, created_at
        FROM activity_logs
        ORDER BY created_at DESC
        LIMIT $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = match sqlx::query(query)
        .bind(LIST_LIMIT)
        .fetch_all(&*pool)
        .instrument(span)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            error!("Failed to list activity logs: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list activity logs".to_string(),
            )
                .into_response();
        }
    };

    let entries: Vec<ActivityLogEntry> = rows
        .into_iter()
        .map(|row| {
            let metadata: Option<String> = row.get("metadata");
            ActivityLogEntry {
                id: row.get("id"),
                actor_id: row.get("actor_id"),
                action: row.get("action"),
                metadata: metadata
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or(Value::Null),
                ip: row.get("ip"),
                user_agent: row.get("user_agent"),
                created_at: row.get("created_at"),
            }
        })
        .collect();

    (StatusCode::OK, Json(entries)).into_response()
}

#[cfg(test)]
mod tests {
    use super::ActivityLogEntry;
    use serde_json::json;

    #[test]
    fn entry_serializes_without_empty_options() {
        let entry = ActivityLogEntry {
            id: uuid::Uuid::nil(),
            actor_id: None,
            action: "Failed Login Attempt".to_string(),
            metadata: json!({"username": "alice"}),
            ip: None,
            user_agent: None,
            created_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap_or_default();
        assert!(value.get("actor_id").is_none());
        assert_eq!(
            value.get("action").and_then(serde_json::Value::as_str),
            Some("Failed Login Attempt")
        );
        assert_eq!(
            value
                .get("metadata")
                .and_then(|m| m.get("username"))
                .and_then(serde_json::Value::as_str),
            Some("alice")
        );
    }
}
