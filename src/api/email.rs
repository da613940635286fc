//! Outbound mail abstraction for the OTP flow.
//!
//! The reset handler only needs "deliver this code to that address"; how the
//! message leaves the process (SMTP, provider API) is a deployment concern
//! behind the `OtpMailer` trait. Dispatch is awaited in the request handler,
//! so a send failure surfaces as a 500 instead of silently dropping the code.
//!
//! The default sender for local dev is `LogMailer`, which logs and returns `Ok(())`.

use anyhow::Result;
use tracing::info;

/// Mail delivery abstraction used by the OTP request handler.
pub trait OtpMailer: Send + Sync {
    /// Deliver a one-time code or return an error to fail the request.
    fn send_code(&self, email: &str, code: &str) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl OtpMailer for LogMailer {
    fn send_code(&self, email: &str, code: &str) -> Result<()> {
        info!(
            to_email = %email,
            code = %code,
            "otp mail send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LogMailer, OtpMailer};

    #[test]
    fn log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer.send_code("user@example.com", "123456").is_ok());
    }
}
