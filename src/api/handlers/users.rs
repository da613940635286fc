//! Identity administration: listing, lookup, profile updates, deletion.
//!
//! Listing and deletion are admin-only; lookup and update allow the owner as
//! well. Every gate runs against the freshly re-resolved role.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::auth::{
    require_auth, require_role,
    storage::{self, UpdateOutcome},
    types::{IdentityProfile, Role},
    utils::{extract_client_ip, extract_user_agent},
    AuthState, Principal,
};
use crate::api::handlers::activity::log_activity;
use crate::api::sanitize::clean_text;

#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct UpdateIdentityRequest {
    #[validate(length(min = 3, max = 30))]
    pub name: Option<String>,
    #[validate(range(min = 18, max = 99))]
    pub age: Option<i32>,
    #[validate(length(min = 9, max = 15))]
    pub phone: Option<String>,
    pub image: Option<String>,
}

fn profile(identity: storage::IdentityRecord) -> IdentityProfile {
    IdentityProfile {
        id: identity.id,
        name: identity.name,
        age: identity.age,
        email: identity.email,
        phone: identity.phone,
        image: identity.image,
        created_at: identity.created_at,
    }
}

fn require_self_or_admin(
    principal: &Principal,
    identity_id: Uuid,
) -> Result<(), (StatusCode, String)> {
    if principal.identity_id == identity_id {
        return Ok(());
    }
    require_role(principal, Role::Admin)
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All identities, newest first", body = [IdentityProfile]),
        (status = 401, description = "Missing or invalid access token", body = String),
        (status = 403, description = "Caller is not an admin", body = String)
    ),
    tag = "users"
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

    match storage::list_identities(&pool).await {
        Ok(identities) => {
            let profiles: Vec<IdentityProfile> = identities.into_iter().map(profile).collect();
            (StatusCode::OK, Json(profiles)).into_response()
        }
        Err(err) => {
            error!("Failed to list identities: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list users".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Identity profile", body = IdentityProfile),
        (status = 403, description = "Caller is neither the owner nor an admin", body = String),
        (status = 404, description = "Unknown identity", body = String)
    ),
    tag = "users"
)]
pub async fn get_by_id(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err((status, message)) => return (status, message).into_response(),
    };
    if let Err((status, message)) = require_self_or_admin(&principal, id) {
        return (status, message).into_response();
    }

    match storage::lookup_identity(&pool, id).await {
        Ok(Some(identity)) => (StatusCode::OK, Json(profile(identity))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "User not found".to_string()).into_response(),
        Err(err) => {
            error!("Identity lookup failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "Identity id")),
    request_body = UpdateIdentityRequest,
    responses(
        (status = 200, description = "Updated identity profile", body = IdentityProfile),
        (status = 403, description = "Caller is neither the owner nor an admin", body = String),
        (status = 404, description = "Unknown identity", body = String),
        (status = 409, description = "Phone already in use", body = String),
        (status = 422, description = "Validation error", body = String)
    ),
    tag = "users"
)]
pub async fn update(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateIdentityRequest>>,
) -> impl IntoResponse {
    let request: UpdateIdentityRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err((status, message)) => return (status, message).into_response(),
    };
    if let Err((status, message)) = require_self_or_admin(&principal, id) {
        return (status, message).into_response();
    }

    if let Err(errors) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Validation error", "errors": errors })),
        )
            .into_response();
    }

    let name = request.name.as_deref().map(|name| clean_text(name.trim()));
    let outcome = storage::update_identity(
        &pool,
        id,
        name.as_deref(),
        request.age,
        request.phone.as_deref(),
        request.image.as_deref(),
    )
    .await;

    match outcome {
        Ok(UpdateOutcome::Updated(identity)) => {
            log_activity(
                &pool,
                Some(principal.identity_id),
                "Profile Updated",
                json!({ "target": id }),
                extract_client_ip(&headers).as_deref(),
                extract_user_agent(&headers).as_deref(),
            )
            .await;
            (StatusCode::OK, Json(profile(identity))).into_response()
        }
        Ok(UpdateOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, "User not found".to_string()).into_response()
        }
        Ok(UpdateOutcome::Conflict) => {
            (StatusCode::CONFLICT, "Phone already in use".to_string()).into_response()
        }
        Err(err) => {
            error!("Identity update failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update user".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "Identity id")),
    responses(
        (status = 204, description = "Identity and credential deleted"),
        (status = 403, description = "Caller is not an admin", body = String),
        (status = 404, description = "Unknown identity", body = String)
    ),
    tag = "users"
)]
pub async fn delete(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
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

    match storage::delete_identity(&pool, id).await {
        Ok(true) => {
            log_activity(
                &pool,
                Some(principal.identity_id),
                "User Deleted",
                json!({ "target": id }),
                extract_client_ip(&headers).as_deref(),
                extract_user_agent(&headers).as_deref(),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (StatusCode::NOT_FOUND, "User not found".to_string()).into_response(),
        Err(err) => {
            error!("Identity deletion failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete user".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, identity_id: Uuid) -> Principal {
        Principal {
            identity_id,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn owner_passes_self_gate() {
        let id = Uuid::new_v4();
        assert!(require_self_or_admin(&principal(Role::Customer, id), id).is_ok());
    }

    #[test]
    fn admin_passes_self_gate_for_others() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(require_self_or_admin(&principal(Role::Admin, id), other).is_ok());
    }

    #[test]
    fn customer_rejected_for_others() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let denied = require_self_or_admin(&principal(Role::Customer, id), other);
        assert_eq!(
            denied.map_err(|(status, _)| status),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn update_request_rejects_out_of_range_age() {
        let request = UpdateIdentityRequest {
            name: None,
            age: Some(17),
            phone: None,
            image: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn update_request_allows_partial_payload() {
        let request = UpdateIdentityRequest {
            name: Some("Alice Cooper".to_string()),
            age: None,
            phone: None,
            image: None,
        };
        assert!(request.validate().is_ok());
    }
}
