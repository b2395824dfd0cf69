//! Postgres-backed user directory and token store.

use super::store::{InsertOutcome, ResetTokenRecord, TokenStore, UserDirectory, UserRecord};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use std::{future::Future, time::Duration};
use tracing::{Instrument, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    /// Connect a small pool; every query is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(timeout)
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool, timeout })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| anyhow!("{operation} timed out after {:?}", self.timeout))?
    }
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn token_from_row(row: &PgRow) -> ResetTokenRecord {
    ResetTokenRecord {
        token_hash: row.get("token_hash"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        claimed_at: row.get("claimed_at"),
    }
}

/// Postgres SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE lower(email) = lower($1)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.bounded("find user by email", async {
            let row = sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup user by email")?;
            Ok(row.as_ref().map(user_from_row))
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.bounded("find user by id", async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup user by id")?;
            Ok(row.as_ref().map(user_from_row))
        })
        .await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let query = r"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        self.bounded("update password", async {
            let result = sqlx::query(query)
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to update password")?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn upsert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord> {
        let query = r"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            ON CONFLICT ((lower(email)))
            DO UPDATE SET password_hash = EXCLUDED.password_hash, updated_at = NOW()
            RETURNING id, email, password_hash, created_at, updated_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        self.bounded("upsert user", async {
            let row = sqlx::query(query)
                .bind(email)
                .bind(password_hash)
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .context("failed to upsert user")?;
            Ok(user_from_row(&row))
        })
        .await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> Result<InsertOutcome> {
        self.bounded("replace reset token", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("begin reset token transaction")?;

            // Row lock on the owner serializes concurrent issues for one user;
            // without it both DELETEs miss the other's uncommitted INSERT.
            let query = "SELECT 1 FROM users WHERE id = $1 FOR UPDATE";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(record.user_id)
                .fetch_optional(&mut *tx)
                .instrument(span)
                .await
                .context("failed to lock user for reset token")?;

            let query = "DELETE FROM password_reset_tokens WHERE user_id = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(record.user_id)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to delete previous reset tokens")?;

            let query = r"
                INSERT INTO password_reset_tokens
                    (token_hash, user_id, expires_at, created_at)
                VALUES ($1, $2, $3, $4)
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(&record.token_hash)
                .bind(record.user_id)
                .bind(record.expires_at)
                .bind(record.created_at)
                .execute(&mut *tx)
                .instrument(span)
                .await;

            if let Err(err) = inserted {
                if is_unique_violation(&err) {
                    // Rolling back keeps the user's previous token.
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("failed to roll back colliding reset token insert: {rollback_err}");
                    }
                    return Ok(InsertOutcome::Collision);
                }
                return Err(err).context("failed to insert reset token");
            }

            tx.commit().await.context("commit reset token transaction")?;
            Ok(InsertOutcome::Inserted)
        })
        .await
    }

    async fn find(&self, token_hash: &[u8]) -> Result<Option<ResetTokenRecord>> {
        let query = r"
            SELECT token_hash, user_id, expires_at, created_at, claimed_at
            FROM password_reset_tokens
            WHERE token_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.bounded("find reset token", async {
            let row = sqlx::query(query)
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup reset token")?;
            Ok(row.as_ref().map(token_from_row))
        })
        .await
    }

    async fn claim(&self, token_hash: &[u8], now: DateTime<Utc>) -> Result<Option<Uuid>> {
        let query = r"
            UPDATE password_reset_tokens
            SET claimed_at = $2
            WHERE token_hash = $1
              AND claimed_at IS NULL
              AND expires_at > $2
            RETURNING user_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        self.bounded("claim reset token", async {
            let row = sqlx::query(query)
                .bind(token_hash)
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to claim reset token")?;
            Ok(row.map(|row| row.get("user_id")))
        })
        .await
    }

    async fn release(&self, token_hash: &[u8]) -> Result<()> {
        let query = "UPDATE password_reset_tokens SET claimed_at = NULL WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        self.bounded("release reset token", async {
            sqlx::query(query)
                .bind(token_hash)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to release reset token")?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, token_hash: &[u8]) -> Result<bool> {
        let query = "DELETE FROM password_reset_tokens WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        self.bounded("delete reset token", async {
            let result = sqlx::query(query)
                .bind(token_hash)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete reset token")?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM password_reset_tokens WHERE expires_at <= $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        self.bounded("delete expired reset tokens", async {
            let result = sqlx::query(query)
                .bind(now)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete expired reset tokens")?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let query = "SELECT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.bounded("ping database", async {
            sqlx::query(query)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("database ping failed")?;
            Ok(())
        })
        .await
    }
}
