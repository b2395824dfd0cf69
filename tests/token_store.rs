//! `TokenStore` behavior shared by every backend.
//!
//! The in-memory store always runs. The Postgres store runs when
//! `RESETD_TEST_DSN` points at a database the schema can be applied to.

use anyhow::{Context, Result, ensure};
use chrono::{Duration, Utc};
use resetd::reset::{
    MemoryStore, PgStore, ResetTokenRecord, TokenStore, UserDirectory, hash_reset_token,
};
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/db/sql/01_resetd.sql"
));

const RACERS: usize = 8;

/// Concurrent issues for one user must leave exactly one live token.
async fn concurrent_replace_keeps_one_token(
    store: Arc<dyn TokenStore>,
    user_id: Uuid,
) -> Result<()> {
    let now = Utc::now();
    let hashes: Vec<Vec<u8>> = (0..RACERS)
        .map(|i| hash_reset_token(&format!("{user_id}-{i}")))
        .collect();

    let mut handles = Vec::new();
    for token_hash in &hashes {
        let store = store.clone();
        let record = ResetTokenRecord {
            token_hash: token_hash.clone(),
            user_id,
            expires_at: now + Duration::minutes(15),
            created_at: now,
            claimed_at: None,
        };
        handles.push(tokio::spawn(async move {
            store.replace_for_user(&record).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let mut live = 0;
    for token_hash in &hashes {
        if store.find(token_hash).await?.is_some() {
            live += 1;
        }
    }
    ensure!(live == 1, "expected one live token, found {live}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_serializes_concurrent_issues() -> Result<()> {
    let store = MemoryStore::new();
    let user = store.insert_user("alice@example.com", "hash")?;
    concurrent_replace_keeps_one_token(Arc::new(store), user.id).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postgres_store_serializes_concurrent_issues() -> Result<()> {
    let Ok(dsn) = std::env::var("RESETD_TEST_DSN") else {
        eprintln!("Skipping Postgres store test: RESETD_TEST_DSN is not set");
        return Ok(());
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&dsn)
        .await
        .context("Failed to connect to RESETD_TEST_DSN")?;
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(&pool)
        .await
        .context("Failed to apply schema")?;

    let store = PgStore::from_pool(pool, std::time::Duration::from_secs(10));
    let user = store
        .upsert_user(&format!("race-{}@example.com", Uuid::new_v4()), "hash")
        .await?;

    let result = concurrent_replace_keeps_one_token(Arc::new(store.clone()), user.id).await;
    store.close().await;
    result
}
