use clap::{Arg, ArgAction, Command};

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_OTP_TTL: &str = "otp-ttl-seconds";
pub const ARG_CAPTCHA_SECRET: &str = "captcha-secret";
pub const ARG_CAPTCHA_VERIFY_URL: &str = "captcha-verify-url";
pub const ARG_SECURE_COOKIES: &str = "secure-cookies";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("Secret used to sign and verify access tokens")
                .env("VENDEJO_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("Secret used to sign and verify refresh tokens")
                .env("VENDEJO_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .default_value("900")
                .env("VENDEJO_ACCESS_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token lifetime in seconds")
                .default_value("604800")
                .env("VENDEJO_REFRESH_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("Password-reset OTP lifetime in seconds")
                .default_value("600")
                .env("VENDEJO_OTP_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_SECRET)
                .long(ARG_CAPTCHA_SECRET)
                .help("CAPTCHA verification secret; when unset, CAPTCHA tokens are ignored")
                .env("VENDEJO_CAPTCHA_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_VERIFY_URL)
                .long(ARG_CAPTCHA_VERIFY_URL)
                .help("CAPTCHA verification endpoint")
                .default_value("https://www.google.com/recaptcha/api/siteverify")
                .env("VENDEJO_CAPTCHA_VERIFY_URL"),
        )
        .arg(
            Arg::new(ARG_SECURE_COOKIES)
                .long(ARG_SECURE_COOKIES)
                .help("Mark the refresh token cookie as Secure (HTTPS deployments)")
                .env("VENDEJO_SECURE_COOKIES")
                .action(ArgAction::SetTrue),
        )
}
