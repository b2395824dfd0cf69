use crate::reset::MAX_TOKEN_TTL_SECONDS;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_NOTIFY_TIMEOUT_SECONDS: &str = "notify-timeout-seconds";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";
pub const ARG_DEV_ECHO_TOKEN: &str = "dev-echo-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub frontend_base_url: String,
    pub token_ttl_seconds: i64,
    pub notify_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub dev_echo_token: bool,
}

impl Options {
    /// Parse reset-flow arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is blank or the TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}")
            })?;

        let token_ttl_seconds = matches
            .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(900);
        if !(1..=MAX_TOKEN_TTL_SECONDS).contains(&token_ttl_seconds) {
            anyhow::bail!(
                "--{ARG_TOKEN_TTL_SECONDS} must be between 1 and {MAX_TOKEN_TTL_SECONDS}"
            );
        }

        Ok(Self {
            frontend_base_url,
            token_ttl_seconds,
            notify_timeout_seconds: matches
                .get_one::<u64>(ARG_NOTIFY_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(300),
            dev_echo_token: matches.get_flag(ARG_DEV_ECHO_TOKEN),
        })
    }
}

/// Store timeout is shared by the server and `create-user`.
#[must_use]
pub fn store_timeout_seconds(matches: &ArgMatches) -> u64 {
    matches
        .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
        .copied()
        .unwrap_or(5)
        .max(1)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset links and the CORS origin")
                .env("RESETD_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Reset token lifetime in seconds (at most one day)")
                .env("RESETD_RESET_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Upper bound for every database call")
                .env("RESETD_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_TIMEOUT_SECONDS)
                .long(ARG_NOTIFY_TIMEOUT_SECONDS)
                .help("Upper bound for delivering a reset link")
                .env("RESETD_NOTIFY_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Interval between expired token sweeps (0 disables)")
                .env("RESETD_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DEV_ECHO_TOKEN)
                .long(ARG_DEV_ECHO_TOKEN)
                .help("Return the raw reset token in request-reset responses (development only)")
                .env("RESETD_DEV_ECHO_TOKEN")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("resetd"))
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("RESETD_FRONTEND_BASE_URL", None::<&str>),
                ("RESETD_RESET_TOKEN_TTL_SECONDS", None),
                ("RESETD_NOTIFY_TIMEOUT_SECONDS", None),
                ("RESETD_SWEEP_INTERVAL_SECONDS", None),
                ("RESETD_STORE_TIMEOUT_SECONDS", None),
                ("RESETD_DEV_ECHO_TOKEN", None),
            ],
            || {
                let matches = command().try_get_matches_from(["resetd"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(
                    options,
                    Options {
                        frontend_base_url: "http://localhost:3000".to_string(),
                        token_ttl_seconds: 900,
                        notify_timeout_seconds: 10,
                        sweep_interval_seconds: 300,
                        dev_echo_token: false,
                    }
                );
                assert_eq!(store_timeout_seconds(&matches), 5);
                Ok(())
            },
        )
    }

    #[test]
    fn env_overrides() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("RESETD_FRONTEND_BASE_URL", Some("https://reset.dev")),
                ("RESETD_RESET_TOKEN_TTL_SECONDS", Some("3600")),
                ("RESETD_SWEEP_INTERVAL_SECONDS", Some("0")),
                ("RESETD_STORE_TIMEOUT_SECONDS", Some("0")),
                ("RESETD_DEV_ECHO_TOKEN", Some("true")),
            ],
            || {
                let matches = command().try_get_matches_from(["resetd"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.frontend_base_url, "https://reset.dev");
                assert_eq!(options.token_ttl_seconds, 3600);
                assert_eq!(options.sweep_interval_seconds, 0);
                assert!(options.dev_echo_token);
                assert_eq!(store_timeout_seconds(&matches), 1);
                Ok(())
            },
        )
    }

    #[test]
    fn ttl_outside_range_is_rejected() {
        temp_env::with_vars([("RESETD_RESET_TOKEN_TTL_SECONDS", None::<&str>)], || {
            for ttl in ["0", "-1", "86401", "10000000000000"] {
                let result =
                    command().try_get_matches_from(["resetd", "--reset-token-ttl-seconds", ttl]);
                assert!(result.is_err(), "ttl {ttl} should be rejected");
            }
        });
    }

    #[test]
    fn ttl_from_env_is_range_checked() {
        temp_env::with_vars([("RESETD_RESET_TOKEN_TTL_SECONDS", Some("99999999"))], || {
            assert!(command().try_get_matches_from(["resetd"]).is_err());
        });
    }

    #[test]
    fn ttl_upper_bound_is_accepted() -> anyhow::Result<()> {
        temp_env::with_vars([("RESETD_RESET_TOKEN_TTL_SECONDS", None::<&str>)], || {
            let matches =
                command().try_get_matches_from(["resetd", "--reset-token-ttl-seconds", "86400"])?;
            assert_eq!(Options::parse(&matches)?.token_ttl_seconds, MAX_TOKEN_TTL_SECONDS);
            Ok(())
        })
    }
}
