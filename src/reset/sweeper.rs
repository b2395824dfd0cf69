use super::manager::ResetManager;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Periodically delete expired reset tokens.
///
/// Returns `None` when `interval` is zero (sweeping disabled). Errors are logged
/// and the loop keeps going; abort the handle to stop it.
#[must_use]
pub fn spawn_expiry_sweeper(
    manager: Arc<ResetManager>,
    interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        info!("expiry sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            sleep(interval).await;

            match manager.prune_expired().await {
                Ok(0) => debug!("no expired reset tokens"),
                Ok(removed) => info!(removed, "pruned expired reset tokens"),
                Err(err) => error!("expiry sweep failed: {err}"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reset::{
        Argon2Hasher, LogNotifier, ManualClock, MemoryStore, ResetConfig, TokenStore,
        UserDirectory,
    };
    use anyhow::Result;
    use chrono::Utc;

    fn manager(store: &MemoryStore, clock: Arc<ManualClock>) -> Arc<ResetManager> {
        Arc::new(
            ResetManager::new(
                ResetConfig::new("https://reset.dev".to_string()),
                Arc::new(store.clone()) as Arc<dyn UserDirectory>,
                Arc::new(store.clone()) as Arc<dyn TokenStore>,
                Arc::new(Argon2Hasher::new()),
                Arc::new(LogNotifier),
            )
            .with_clock(clock),
        )
    }

    #[tokio::test]
    async fn zero_interval_disables_sweeper() {
        let store = MemoryStore::new();
        let handle = spawn_expiry_sweeper(
            manager(&store, Arc::new(ManualClock::default())),
            Duration::ZERO,
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn sweeper_prunes_expired_tokens() -> Result<()> {
        let store = MemoryStore::new();
        store.insert_user("alice@example.com", "hash")?;
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = manager(&store, clock.clone());

        manager.issue("alice@example.com").await?;
        clock.advance(chrono::Duration::hours(1));

        let handle = spawn_expiry_sweeper(manager, Duration::from_millis(10));
        for _ in 0..100 {
            if store.token_count()? == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        if let Some(handle) = handle {
            handle.abort();
        }

        assert_eq!(store.token_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn sweeper_survives_store_errors() -> Result<()> {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let handle = spawn_expiry_sweeper(
            manager(&store, Arc::new(ManualClock::default())),
            Duration::from_millis(5),
        );

        sleep(Duration::from_millis(50)).await;
        let finished = handle.as_ref().map(tokio::task::JoinHandle::is_finished);
        if let Some(handle) = handle {
            handle.abort();
        }

        assert_eq!(finished, Some(false));
        Ok(())
    }
}
