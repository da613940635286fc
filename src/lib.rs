//! # Vendejo (Storefront Identity & Access)
//!
//! `vendejo` is the identity and access backend for a storefront: account
//! registration, credential login, access/refresh token lifecycle, OTP-based
//! password recovery, role-gated administration, and audit logging.
//!
//! ## Roles
//!
//! Every credential carries a role (`customer` or `admin`). The role stored on
//! the credential row is authoritative: authenticated requests re-read it on
//! every pass, so a promotion or demotion takes effect on the next request
//! rather than when a token happens to expire.
//!
//! ## Tokens
//!
//! Access tokens are short-lived HS256 assertions verified purely by
//! signature and expiry. Refresh tokens are longer-lived and additionally
//! checked against the `refresh_sessions` table, where only a SHA-256 of the
//! token is kept; revoking the row invalidates the token before its expiry.
//!
//! ## Abuse mitigation
//!
//! Registration and login sit behind fixed-window rate limits keyed by client
//! address and by address + username. A successful CAPTCHA verification
//! pre-clears the address limiter for that single request.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
