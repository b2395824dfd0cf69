use thiserror::Error;

/// Failure taxonomy for the reset lifecycle.
///
/// `NotFound` and `Expired` come from `verify`; `consume` folds both into
/// `InvalidOrExpired` so callers cannot tell a consumed token from a bogus one.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("reset token not found")]
    NotFound,
    #[error("reset token expired")]
    Expired,
    #[error("invalid or expired reset token")]
    InvalidOrExpired,
    #[error("{0}")]
    WeakPassword(String),
    #[error("reset token collided on every attempt ({0})")]
    Collision(u32),
    #[error("failed to generate reset token: {0:#}")]
    TokenGeneration(anyhow::Error),
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
    #[error("notifier failure: {0:#}")]
    Notifier(anyhow::Error),
}

impl ResetError {
    /// True for outcomes caused by the caller's input rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Expired | Self::InvalidOrExpired | Self::WeakPassword(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ResetError;
    use anyhow::anyhow;

    #[test]
    fn client_errors_are_classified() {
        assert!(ResetError::NotFound.is_client_error());
        assert!(ResetError::Expired.is_client_error());
        assert!(ResetError::InvalidOrExpired.is_client_error());
        assert!(ResetError::WeakPassword("too short".to_string()).is_client_error());
        assert!(!ResetError::Collision(3).is_client_error());
        assert!(!ResetError::Persistence(anyhow!("db down")).is_client_error());
    }

    #[test]
    fn persistence_message_keeps_context_chain() {
        let err = ResetError::Persistence(anyhow!("connection refused").context("find token"));
        assert_eq!(
            err.to_string(),
            "persistence failure: find token: connection refused"
        );
    }
}
