use crate::{
    api,
    reset::{
        Argon2Hasher, LogNotifier, Notifier, PgStore, ResetConfig, ResetManager, SmtpConfig,
        SmtpNotifier, TokenStore, UserDirectory, spawn_expiry_sweeper,
    },
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub store_timeout: Duration,
    pub frontend_base_url: String,
    pub token_ttl_seconds: i64,
    pub notify_timeout: Duration,
    pub sweep_interval: Duration,
    pub dev_echo_token: bool,
    pub smtp: Option<SmtpConfig>,
}

fn notifier(smtp: Option<&SmtpConfig>) -> Result<Arc<dyn Notifier>> {
    match smtp {
        Some(config) => {
            info!(host = %config.host, port = config.port, "sending reset links over SMTP");
            Ok(Arc::new(
                SmtpNotifier::new(config).context("Failed to configure SMTP notifier")?,
            ))
        }
        None => {
            warn!("no SMTP relay configured, reset links are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the notifier cannot be
/// configured, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = PgStore::connect(&args.dsn, args.store_timeout).await?;

    let notifier = notifier(args.smtp.as_ref())?;

    if args.dev_echo_token {
        warn!("--dev-echo-token is enabled, raw reset tokens are returned to clients");
    }

    let config = ResetConfig::new(args.frontend_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_notify_timeout(args.notify_timeout);

    let manager = Arc::new(ResetManager::new(
        config,
        Arc::new(store.clone()) as Arc<dyn UserDirectory>,
        Arc::new(store.clone()) as Arc<dyn TokenStore>,
        Arc::new(Argon2Hasher::new()),
        notifier,
    ));

    let sweeper = spawn_expiry_sweeper(manager.clone(), args.sweep_interval);

    let app = api::app(manager, args.dev_echo_token)?;
    let served = api::new(args.port, app, api::shutdown_signal()).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    store.close().await;
    info!("shutdown complete");

    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn log_notifier_without_smtp() {
        assert!(notifier(None).is_ok());
    }

    #[tokio::test]
    async fn smtp_notifier_when_configured() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: None,
            password: Some(SecretString::from("unused")),
            from: "no-reply@example.com".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(notifier(Some(&config)).is_ok());
    }

    #[tokio::test]
    async fn invalid_sender_fails() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "nope".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(notifier(Some(&config)).is_err());
    }
}
