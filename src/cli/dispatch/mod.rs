use crate::cli::{
    actions::{server, Action},
    commands::auth,
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: --{name}"))
    };

    Ok(Action::Server(Box::new(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: required("dsn")?,
        access_token_secret: SecretString::from(required(auth::ARG_ACCESS_TOKEN_SECRET)?),
        refresh_token_secret: SecretString::from(required(auth::ARG_REFRESH_TOKEN_SECRET)?),
        access_token_ttl_seconds: matches
            .get_one::<i64>(auth::ARG_ACCESS_TOKEN_TTL)
            .copied()
            .unwrap_or(900),
        refresh_token_ttl_seconds: matches
            .get_one::<i64>(auth::ARG_REFRESH_TOKEN_TTL)
            .copied()
            .unwrap_or(604_800),
        otp_ttl_seconds: matches
            .get_one::<i64>(auth::ARG_OTP_TTL)
            .copied()
            .unwrap_or(600),
        captcha_secret: matches
            .get_one::<String>(auth::ARG_CAPTCHA_SECRET)
            .cloned()
            .map(SecretString::from),
        captcha_verify_url: required(auth::ARG_CAPTCHA_VERIFY_URL)?,
        secure_cookies: matches.get_flag(auth::ARG_SECURE_COOKIES),
    })))
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars([("VENDEJO_CAPTCHA_SECRET", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "vendejo",
                "--dsn",
                "postgres://localhost:5432/vendejo",
                "--access-token-secret",
                "access-secret",
                "--refresh-token-secret",
                "refresh-secret",
                "--port",
                "9090",
            ]);

            let action = handler(&matches);
            assert!(action.is_ok());
            if let Ok(Action::Server(args)) = action {
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost:5432/vendejo");
                assert_eq!(args.access_token_secret.expose_secret(), "access-secret");
                assert_eq!(args.refresh_token_secret.expose_secret(), "refresh-secret");
                assert_eq!(args.access_token_ttl_seconds, 900);
                assert_eq!(args.refresh_token_ttl_seconds, 604_800);
                assert_eq!(args.otp_ttl_seconds, 600);
                assert!(args.captcha_secret.is_none());
                assert!(!args.secure_cookies);
            }
        });
    }
}
