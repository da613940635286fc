//! Auth handlers and supporting modules.
//!
//! This module coordinates registration, login, token refresh/revocation,
//! and OTP password recovery.
//!
//! ## Role re-resolution
//!
//! Tokens are trusted for identity only. On every authenticated request the
//! middleware re-reads the credential row and overwrites the token's role
//! claim with the stored value, so demotions and promotions apply on the
//! next request instead of surviving until token expiry.
//!
//! ## Rate limiting
//!
//! Credential endpoints are limited per client address (3 attempts / 10
//! minutes, bypassable by a verified CAPTCHA for that single request) and
//! per address + username pair (5 attempts / 10 minutes).

mod captcha;
pub(crate) mod login;
pub(crate) mod otp;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod refresh;
pub(crate) mod register;
mod state;
pub(crate) mod storage;
mod tokens;
pub(crate) mod types;
pub(crate) mod utils;

pub use principal::{require_auth, require_role, Principal};
pub use rate_limit::{FixedWindowLimiter, NoopRateLimiter, RateLimiter};
pub use state::{AuthConfig, AuthState, CaptchaConfig};
pub use types::Role;
