use crate::reset::SmtpConfig;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_EMAIL_FROM: &str = "email-from";

#[derive(Debug, Clone)]
pub struct Options {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: Option<String>,
}

impl Options {
    /// Parse SMTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a relay host is configured without a sender address.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let options = Self {
            host: get_non_empty(ARG_SMTP_HOST),
            port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
            username: get_non_empty(ARG_SMTP_USERNAME),
            password: get_non_empty(ARG_SMTP_PASSWORD).map(SecretString::from),
            from: get_non_empty(ARG_EMAIL_FROM),
        };

        if options.host.is_some() && options.from.is_none() {
            anyhow::bail!(
                "missing required argument: --{ARG_EMAIL_FROM} (required with --{ARG_SMTP_HOST})"
            );
        }

        Ok(options)
    }

    /// `None` when no relay is configured; the log notifier is used instead.
    #[must_use]
    pub fn into_config(self, timeout: Duration) -> Option<SmtpConfig> {
        let host = self.host?;
        let from = self.from?;
        Some(SmtpConfig {
            host,
            port: self.port,
            username: self.username,
            password: self.password,
            from,
            timeout,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host (STARTTLS); reset links are only logged when unset")
                .env("RESETD_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("RESETD_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("RESETD_SMTP_USERNAME")
                .requires(ARG_SMTP_PASSWORD),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("RESETD_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender mailbox, e.g. \"Password Reset <no-reply@example.com>\"")
                .env("RESETD_EMAIL_FROM"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        temp_env::with_vars(
            [
                ("RESETD_SMTP_HOST", None::<&str>),
                ("RESETD_SMTP_PORT", None),
                ("RESETD_SMTP_USERNAME", None),
                ("RESETD_SMTP_PASSWORD", None),
                ("RESETD_EMAIL_FROM", None),
            ],
            f,
        )
    }

    fn command() -> Command {
        with_args(Command::new("resetd"))
    }

    #[test]
    fn no_host_means_no_smtp() -> anyhow::Result<()> {
        clean_env(|| {
            let matches = command().try_get_matches_from(["resetd"])?;
            let options = Options::parse(&matches)?;
            assert!(options.into_config(Duration::from_secs(10)).is_none());
            Ok(())
        })
    }

    #[test]
    fn full_smtp_config() -> anyhow::Result<()> {
        clean_env(|| {
            let matches = command().try_get_matches_from([
                "resetd",
                "--smtp-host",
                "smtp.gmail.com",
                "--smtp-username",
                "mailer@example.com",
                "--smtp-password",
                "app-password",
                "--email-from",
                "Password Reset App <mailer@example.com>",
            ])?;
            let config = Options::parse(&matches)?
                .into_config(Duration::from_secs(10))
                .ok_or_else(|| anyhow::anyhow!("expected smtp config"))?;
            assert_eq!(config.host, "smtp.gmail.com");
            assert_eq!(config.port, 587);
            assert_eq!(config.username.as_deref(), Some("mailer@example.com"));
            assert_eq!(
                config.password.as_ref().map(|p| p.expose_secret().to_string()),
                Some("app-password".to_string())
            );
            Ok(())
        })
    }

    #[test]
    fn host_requires_sender() -> anyhow::Result<()> {
        clean_env(|| {
            let matches =
                command().try_get_matches_from(["resetd", "--smtp-host", "smtp.gmail.com"])?;
            assert!(Options::parse(&matches).is_err());
            Ok(())
        })
    }

    #[test]
    fn username_requires_password() {
        clean_env(|| {
            let result = command().try_get_matches_from([
                "resetd",
                "--smtp-host",
                "smtp.gmail.com",
                "--smtp-username",
                "mailer",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn password_is_redacted_in_debug() -> anyhow::Result<()> {
        clean_env(|| {
            let matches = command().try_get_matches_from([
                "resetd",
                "--smtp-username",
                "mailer",
                "--smtp-password",
                "super-secret",
            ])?;
            let options = Options::parse(&matches)?;
            assert!(!format!("{options:?}").contains("super-secret"));
            Ok(())
        })
    }
}
