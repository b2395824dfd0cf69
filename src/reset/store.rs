//! Storage seams for users and reset tokens.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user as seen by the reset flow.
#[derive(Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// A persisted reset token. Only the SHA-256 digest of the token is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetTokenRecord {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set while a consume is in flight.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ResetTokenRecord {
    /// Valid iff unclaimed and `now < expires_at`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.claimed_at.is_none() && now < self.expires_at
    }
}

/// Outcome of persisting a freshly generated token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The digest already exists; nothing was written or deleted.
    Collision,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    /// Store a new password hash. Returns `false` if the user no longer exists.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    /// Insert a user or replace the password hash of an existing one.
    async fn upsert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Delete every token of `record.user_id` and insert `record`, as one unit.
    ///
    /// A digest collision leaves existing tokens untouched and returns
    /// [`InsertOutcome::Collision`].
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> Result<InsertOutcome>;

    async fn find(&self, token_hash: &[u8]) -> Result<Option<ResetTokenRecord>>;

    /// Atomically mark an unclaimed, unexpired token as claimed.
    ///
    /// Returns the owning user id, or `None` if another caller got there first,
    /// the token expired, or it does not exist.
    async fn claim(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<Option<Uuid>>;

    /// Undo a claim so the token can be used again.
    async fn release(&self, token_hash: &[u8]) -> Result<()>;

    /// Returns `true` if a row was deleted.
    async fn delete(&self, token_hash: &[u8]) -> Result<bool>;

    /// Delete every token with `expires_at <= now`; returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Cheap reachability check used by `/health`.
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_in: Duration, claimed: bool) -> ResetTokenRecord {
        let now = Utc::now();
        ResetTokenRecord {
            token_hash: vec![1, 2, 3],
            user_id: Uuid::nil(),
            expires_at: now + expires_in,
            created_at: now,
            claimed_at: claimed.then_some(now),
        }
    }

    #[test]
    fn record_validity_requires_future_expiry_and_no_claim() {
        let now = Utc::now();
        assert!(record(Duration::minutes(5), false).is_valid_at(now));
        assert!(!record(Duration::minutes(-5), false).is_valid_at(now));
        assert!(!record(Duration::minutes(5), true).is_valid_at(now));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let rec = record(Duration::minutes(5), false);
        assert!(!rec.is_valid_at(rec.expires_at));
    }

    #[test]
    fn user_record_debug_redacts_hash() {
        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: now,
            updated_at: now,
        };
        let debug = format!("{user:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("$argon2id$secret"));
    }
}
