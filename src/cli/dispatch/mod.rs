//! Map validated CLI matches to an action.

use crate::cli::actions::{Action, create_user, server};
use crate::cli::commands::{ARG_DSN, ARG_PORT, reset, smtp, user};
use anyhow::{Context, Result};
use std::time::Duration;

/// Map validated CLI matches to a server or `create-user` action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let store_timeout = Duration::from_secs(reset::store_timeout_seconds(matches));

    if let Some(sub) = matches.subcommand_matches(user::CMD_CREATE_USER) {
        let user_opts = user::Options::parse(sub)?;
        return Ok(Action::CreateUser(create_user::Args {
            dsn,
            store_timeout,
            email: user_opts.email,
            password: user_opts.password,
        }));
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let reset_opts = reset::Options::parse(matches)?;
    let notify_timeout = Duration::from_secs(reset_opts.notify_timeout_seconds);
    let smtp = smtp::Options::parse(matches)?.into_config(notify_timeout);

    Ok(Action::Server(server::Args {
        port,
        dsn,
        store_timeout,
        frontend_base_url: reset_opts.frontend_base_url,
        token_ttl_seconds: reset_opts.token_ttl_seconds,
        notify_timeout,
        sweep_interval: Duration::from_secs(reset_opts.sweep_interval_seconds),
        dev_echo_token: reset_opts.dev_echo_token,
        smtp,
    }))
}
