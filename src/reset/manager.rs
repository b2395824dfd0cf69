//! Reset token issuance, verification, and single-use consumption.

use super::{
    clock::{Clock, SystemClock},
    error::ResetError,
    hasher::CredentialHasher,
    notifier::{Notifier, ResetNotice},
    store::{InsertOutcome, ResetTokenRecord, TokenStore, UserDirectory, UserRecord},
    token::{OsTokenGenerator, TokenGenerator, build_reset_url, hash_reset_token, normalize_email},
};
use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 15 * 60;
/// Upper bound for the token lifetime (one day).
pub const MAX_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_NOTIFY_TIMEOUT_SECONDS: u64 = 10;
const MAX_ISSUE_ATTEMPTS: u32 = 3;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone, Debug)]
pub struct ResetConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    notify_timeout: Duration,
}

impl ResetConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds.clamp(1, MAX_TOKEN_TTL_SECONDS);
        self
    }

    #[must_use]
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_seconds)
    }

    /// TTL rounded up to whole minutes, for human-facing copy.
    #[must_use]
    pub fn token_ttl_minutes(&self) -> i64 {
        (self.token_ttl_seconds + 59) / 60
    }

    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        self.notify_timeout
    }
}

/// A freshly persisted token. `token` is the only copy of the raw value.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: SecretString,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Background delivery of the reset link. Resolves to `false` when the
    /// notifier failed or timed out; the token stays valid either way.
    /// Dropping the handle does not cancel delivery.
    pub delivery: JoinHandle<bool>,
}

#[derive(Debug)]
pub enum IssueOutcome {
    Issued(IssuedToken),
    NoSuchUser,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ResetManager {
    config: ResetConfig,
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn TokenStore>,
    hasher: Arc<dyn CredentialHasher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    generator: Arc<dyn TokenGenerator>,
}

impl ResetManager {
    #[must_use]
    pub fn new(
        config: ResetConfig,
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn TokenStore>,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            users,
            tokens,
            hasher,
            notifier,
            clock: Arc::new(SystemClock),
            generator: Arc::new(OsTokenGenerator),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_token_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResetConfig {
        &self.config
    }

    /// Issue a reset token for `email` and hand the link to the notifier.
    ///
    /// Any previous token of the user is deleted in the same storage unit.
    ///
    /// # Errors
    /// `Persistence` when the directory or store fails, `Collision` when every
    /// generated token collided, `TokenGeneration` when the random source fails.
    pub async fn issue(&self, email: &str) -> Result<IssueOutcome, ResetError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(ResetError::Persistence)?;

        let Some(user) = user else {
            debug!("password reset requested for unknown email");
            return Ok(IssueOutcome::NoSuchUser);
        };

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.config.token_ttl())
            .ok_or_else(|| {
                ResetError::TokenGeneration(anyhow!(
                    "token expiry out of range: {now} + {}s",
                    self.config.token_ttl_seconds()
                ))
            })?;

        let mut attempts = 0;
        let token = loop {
            attempts += 1;
            let token = self
                .generator
                .generate()
                .map_err(ResetError::TokenGeneration)?;
            let record = ResetTokenRecord {
                token_hash: hash_reset_token(&token),
                user_id: user.id,
                expires_at,
                created_at: now,
                claimed_at: None,
            };
            match self
                .tokens
                .replace_for_user(&record)
                .await
                .map_err(ResetError::Persistence)?
            {
                InsertOutcome::Inserted => break token,
                InsertOutcome::Collision => {
                    warn!(attempt = attempts, "reset token collision");
                    if attempts >= MAX_ISSUE_ATTEMPTS {
                        return Err(ResetError::Collision(attempts));
                    }
                }
            }
        };

        debug!(user_id = %user.id, %expires_at, "reset token issued");

        let delivery = self.spawn_notify(&user, &token, expires_at);

        Ok(IssueOutcome::Issued(IssuedToken {
            token: SecretString::from(token),
            user_id: user.id,
            expires_at,
            delivery,
        }))
    }

    /// Deliver the link off the request path so a known email answers as fast
    /// as an unknown one.
    fn spawn_notify(
        &self,
        user: &UserRecord,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> JoinHandle<bool> {
        let notice = ResetNotice {
            to_email: user.email.clone(),
            reset_url: SecretString::from(build_reset_url(
                self.config.frontend_base_url(),
                token,
                &user.email,
            )),
            expires_at,
            ttl_minutes: self.config.token_ttl_minutes(),
        };
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.config.notify_timeout();
        let user_id = user.id;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, notifier.send(&notice)).await {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    let err = ResetError::Notifier(err);
                    error!(%user_id, "{err}");
                    false
                }
                Err(_) => {
                    error!(%user_id, ?timeout, "reset notifier timed out");
                    false
                }
            }
        })
    }

    /// Check a token without consuming it.
    ///
    /// Expired records are deleted on the way out. A claimed token, or one whose
    /// owner no longer exists, reads as `NotFound`.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, or `Persistence`.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, ResetError> {
        if token.is_empty() {
            return Err(ResetError::NotFound);
        }
        let token_hash = hash_reset_token(token);

        let record = self
            .tokens
            .find(&token_hash)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::NotFound)?;

        if self.clock.now() >= record.expires_at {
            self.discard_expired(&token_hash).await;
            return Err(ResetError::Expired);
        }
        if record.claimed_at.is_some() {
            return Err(ResetError::NotFound);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::NotFound)?;

        Ok(VerifiedToken {
            user_id: user.id,
            email: user.email,
            expires_at: record.expires_at,
        })
    }

    /// Set a new password using a reset token. The token is single-use.
    ///
    /// # Errors
    /// `WeakPassword` before any token work, `InvalidOrExpired` for unknown,
    /// expired, or already claimed tokens, `Persistence` when hashing or the
    /// directory update fails (the token stays usable).
    pub async fn consume(&self, token: &str, new_password: &str) -> Result<(), ResetError> {
        validate_password(new_password)?;

        if token.is_empty() {
            return Err(ResetError::InvalidOrExpired);
        }
        let token_hash = hash_reset_token(token);
        let now = self.clock.now();

        let record = self
            .tokens
            .find(&token_hash)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::InvalidOrExpired)?;

        if now >= record.expires_at {
            self.discard_expired(&token_hash).await;
            return Err(ResetError::InvalidOrExpired);
        }

        let user_id = self
            .tokens
            .claim(&token_hash, now)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::InvalidOrExpired)?;

        match self.apply_password(user_id, new_password).await {
            Ok(true) => {}
            Ok(false) => {
                // Owner vanished; the token can never succeed.
                self.discard_claimed(&token_hash).await;
                return Err(ResetError::InvalidOrExpired);
            }
            Err(err) => {
                if let Err(release_err) = self.tokens.release(&token_hash).await {
                    error!("failed to release reset token claim: {release_err:#}");
                }
                return Err(ResetError::Persistence(err));
            }
        }

        self.discard_claimed(&token_hash).await;
        info!(%user_id, "password reset completed");
        Ok(())
    }

    async fn apply_password(&self, user_id: Uuid, new_password: &str) -> anyhow::Result<bool> {
        let hasher = Arc::clone(&self.hasher);
        let password = new_password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")??;

        self.users.update_password(user_id, &password_hash).await
    }

    async fn discard_expired(&self, token_hash: &[u8]) {
        if let Err(err) = self.tokens.delete(token_hash).await {
            warn!("failed to delete expired reset token: {err:#}");
        }
    }

    async fn discard_claimed(&self, token_hash: &[u8]) {
        // A claimed token never verifies again, so a failed delete only leaves
        // a dead row for the sweeper.
        if let Err(err) = self.tokens.delete(token_hash).await {
            error!("failed to delete consumed reset token: {err:#}");
        }
    }

    /// Create a user or replace the password of an existing one.
    ///
    /// # Errors
    /// `WeakPassword` or `Persistence`.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, ResetError> {
        validate_password(password)?;
        let email = normalize_email(email);
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")
            .and_then(|hashed| hashed)
            .map_err(ResetError::Persistence)?;

        self.users
            .upsert_user(&email, &password_hash)
            .await
            .map_err(ResetError::Persistence)
    }

    /// Delete every expired token. Returns the number removed.
    ///
    /// # Errors
    /// `Persistence` when the store fails.
    pub async fn prune_expired(&self) -> Result<u64, ResetError> {
        self.tokens
            .delete_expired(self.clock.now())
            .await
            .map_err(ResetError::Persistence)
    }

    /// # Errors
    /// `Persistence` when the store is unreachable.
    pub async fn check_store(&self) -> Result<(), ResetError> {
        self.tokens.ping().await.map_err(ResetError::Persistence)
    }
}

/// At least 8 characters with a lowercase letter, an uppercase letter and a digit.
///
/// # Errors
/// `WeakPassword` describing the first rule that failed.
pub fn validate_password(password: &str) -> Result<(), ResetError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ResetError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(ResetError::WeakPassword(
            "Password must contain at least one lowercase letter, one uppercase letter, and one number"
                .to_string(),
        ));
    }
    Ok(())
}
