use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const CMD_CREATE_USER: &str = "create-user";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";

#[derive(Debug, Clone)]
pub struct Options {
    pub email: String,
    pub password: SecretString,
}

impl Options {
    /// Parse `create-user` arguments from the subcommand matches.
    ///
    /// # Errors
    /// Returns an error if the email or password is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let email = matches
            .get_one::<String>(ARG_EMAIL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_EMAIL}"))?;
        let password = matches
            .get_one::<String>(ARG_PASSWORD)
            .cloned()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_PASSWORD}"))?;

        Ok(Self {
            email,
            password: SecretString::from(password),
        })
    }
}

#[must_use]
pub fn subcommand() -> Command {
    Command::new(CMD_CREATE_USER)
        .about("Create a user, or replace the password of an existing one")
        .arg(
            Arg::new(ARG_EMAIL)
                .long(ARG_EMAIL)
                .help("User email (stored lowercased)")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Initial password")
                .env("RESETD_USER_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}
