use crate::reset::{
    Argon2Hasher, LogNotifier, PgStore, ResetConfig, ResetManager, TokenStore, UserDirectory,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::info;

pub struct Args {
    pub dsn: String,
    pub store_timeout: Duration,
    pub email: String,
    pub password: SecretString,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("dsn", &"[REDACTED]")
            .field("store_timeout", &self.store_timeout)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Create a user, or overwrite the password of an existing one.
/// # Errors
/// Returns an error if the database is unreachable or the password is rejected.
pub async fn execute(args: Args) -> Result<()> {
    let store = PgStore::connect(&args.dsn, args.store_timeout).await?;

    // Only `create_user` is used; the frontend URL never reaches a link.
    let manager = ResetManager::new(
        ResetConfig::new(String::new()),
        Arc::new(store.clone()) as Arc<dyn UserDirectory>,
        Arc::new(store.clone()) as Arc<dyn TokenStore>,
        Arc::new(Argon2Hasher::new()),
        Arc::new(LogNotifier),
    );

    let result = manager
        .create_user(&args.email, args.password.expose_secret())
        .await;
    store.close().await;

    let user = result.with_context(|| format!("Failed to create user {}", args.email))?;
    info!(user_id = %user.id, "user saved");
    println!("User saved: {} ({})", user.email, user.id);

    Ok(())
}
