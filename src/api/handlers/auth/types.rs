//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Authorization tier. The value stored on the credential row is the source
/// of truth; token claims are only a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }

    /// Parse a stored role. Unknown values fall back to the least-privileged
    /// tier rather than failing the request.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            _ => Self::Customer,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn alphanumeric(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("alphanumeric"))
    }
}

fn phone_digits(value: &str) -> Result<(), ValidationError> {
    if (9..=15).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

/// Registration payload. A `role` field is deliberately absent: the server
/// always assigns `customer`.
#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30), custom(function = alphanumeric))]
    pub username: String,
    #[validate(length(min = 8, max = 100))]
    pub password: String,
    #[validate(length(min = 3, max = 30))]
    pub name: String,
    #[validate(range(min = 18, max = 99))]
    pub age: i32,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = phone_digits))]
    pub phone: String,
    pub image: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 30))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub password: String,
    /// Optional CAPTCHA response; a verified one pre-clears the address
    /// rate limiter for this request only.
    pub captcha_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct OtpRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct OtpVerifyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Debug)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
    pub reset_ticket: String,
    #[validate(length(min = 8, max = 100))]
    pub new_password: String,
}

/// Public identity fields returned by registration and profile endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IdentityProfile {
    pub id: Uuid,
    pub name: String,
    pub age: i32,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    pub user: IdentityProfile,
    pub access_token: String,
    /// Also set as an `HttpOnly`/`SameSite=Strict` cookie.
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    /// Also set as an `HttpOnly`/`SameSite=Strict` cookie.
    pub refresh_token: String,
    pub role: Role,
    pub user_id: Uuid,
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpVerifyResponse {
    pub message: String,
    pub user_id: Uuid,
    /// Single-use ticket required by the reset endpoint; expires with the OTP.
    pub reset_ticket: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub profile: IdentityProfile,
    pub username: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            username: "alice01".to_string(),
            password: "Secret123!".to_string(),
            name: "Alice".to_string(),
            age: 30,
            email: "alice@example.com".to_string(),
            phone: "123456789".to_string(),
            image: None,
        }
    }

    #[test]
    fn register_request_valid() {
        assert!(register_request().validate().is_ok());
    }

    #[test]
    fn register_request_rejects_bad_username() {
        let mut request = register_request();
        request.username = "al".to_string();
        assert!(request.validate().is_err());

        request.username = "alice!".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_request_rejects_bad_age() {
        let mut request = register_request();
        request.age = 17;
        assert!(request.validate().is_err());

        request.age = 100;
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_request_rejects_bad_phone() {
        let mut request = register_request();
        request.phone = "12345678".to_string();
        assert!(request.validate().is_err());

        request.phone = "12345678a".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_request_rejects_bad_email() {
        let mut request = register_request();
        request.email = "not-an-email".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_request_rejects_short_password() {
        let mut request = register_request();
        request.password = "short".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn register_request_ignores_injected_role() {
        // Operator-object and role-injection payloads must not deserialize
        // into anything the handler would trust.
        let value = serde_json::json!({
            "username": "alice01",
            "password": "Secret123!",
            "name": "Alice",
            "age": 30,
            "email": "alice@example.com",
            "phone": "123456789",
            "role": "admin"
        });
        let decoded: Result<RegisterRequest, _> = serde_json::from_value(value);
        assert!(decoded.is_ok());
    }

    #[test]
    fn login_request_rejects_operator_objects() {
        let value = serde_json::json!({
            "username": {"$ne": null},
            "password": "whatever"
        });
        let decoded: Result<LoginRequest, _> = serde_json::from_value(value);
        assert!(decoded.is_err());
    }

    #[test]
    fn role_round_trips_and_falls_back() {
        assert_eq!(Role::from_db("admin"), Role::Admin);
        assert_eq!(Role::from_db("customer"), Role::Customer);
        assert_eq!(Role::from_db("superuser"), Role::Customer);
        assert_eq!(Role::Admin.to_string(), "admin");

        let encoded = serde_json::to_string(&Role::Admin).unwrap_or_default();
        assert_eq!(encoded, "\"admin\"");
    }
}
