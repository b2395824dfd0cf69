//! In-memory user directory and token store.
//!
//! Backs the unit and integration tests and local runs without Postgres. A single
//! mutex guards both maps so `replace_for_user` and `claim` are atomic.

use super::store::{InsertOutcome, ResetTokenRecord, TokenStore, UserDirectory, UserRecord};
use super::token::normalize_email;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    tokens: HashMap<Vec<u8>, ResetTokenRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_password_updates: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Seed a user with an already-hashed password.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub fn insert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord> {
        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.lock()?.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Remove a user and, like `ON DELETE CASCADE`, its tokens.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub fn remove_user(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.tokens.retain(|_, record| record.user_id != id);
        Ok(inner.users.remove(&id).is_some())
    }

    /// Number of token records currently stored, claimed or not.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub fn token_count(&self) -> Result<usize> {
        Ok(self.lock()?.tokens.len())
    }

    /// Token records owned by `user_id`.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub fn tokens_for(&self, user_id: Uuid) -> Result<Vec<ResetTokenRecord>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Make every subsequent `update_password` fail.
    pub fn fail_password_updates(&self, fail: bool) {
        self.fail_password_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail, as if the backing database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

// Same rule as `lower(email) = lower($1)` plus the manager's trimming.
fn same_email(stored: &str, candidate: &str) -> bool {
    normalize_email(stored) == normalize_email(candidate)
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| same_email(&user.email, email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        if self.fail_password_updates.load(Ordering::SeqCst) {
            bail!("password update rejected");
        }
        let mut inner = self.lock()?;
        Ok(inner.users.get_mut(&id).is_some_and(|user| {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
            true
        }))
    }

    async fn upsert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        if let Some(user) = inner
            .users
            .values_mut()
            .find(|user| same_email(&user.email, email))
        {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
            return Ok(user.clone());
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> Result<InsertOutcome> {
        let mut inner = self.lock()?;
        // Same visibility as the Postgres transaction: the user's own tokens are
        // deleted before the insert, so only other users' digests can collide.
        if inner
            .tokens
            .get(&record.token_hash)
            .is_some_and(|existing| existing.user_id != record.user_id)
        {
            return Ok(InsertOutcome::Collision);
        }
        inner.tokens.retain(|_, existing| existing.user_id != record.user_id);
        inner
            .tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<ResetTokenRecord>> {
        Ok(self.lock()?.tokens.get(token_hash).cloned())
    }

    async fn claim(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<Option<Uuid>> {
        let mut inner = self.lock()?;
        Ok(inner.tokens.get_mut(token_hash).and_then(|record| {
            if record.is_valid_at(now) {
                record.claimed_at = Some(now);
                Some(record.user_id)
            } else {
                None
            }
        }))
    }

    async fn release(&self, token_hash: &[u8]) -> Result<()> {
        if let Some(record) = self.lock()?.tokens.get_mut(token_hash) {
            record.claimed_at = None;
        }
        Ok(())
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<bool> {
        Ok(self.lock()?.tokens.remove(token_hash).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock()?;
        let before = inner.tokens.len();
        inner.tokens.retain(|_, record| record.expires_at > now);
        Ok(u64::try_from(before - inner.tokens.len()).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
