//! API handlers for resetd.

pub mod health;
pub mod reset;
pub mod root;
pub mod types;

use crate::reset::ResetManager;
use std::sync::Arc;

/// Shared handler state: the reset manager plus HTTP-only switches.
pub struct ResetState {
    manager: Arc<ResetManager>,
    dev_echo_token: bool,
}

impl ResetState {
    #[must_use]
    pub fn new(manager: Arc<ResetManager>, dev_echo_token: bool) -> Self {
        Self {
            manager,
            dev_echo_token,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &ResetManager {
        &self.manager
    }

    /// Include the raw token in request-reset responses (development only).
    #[must_use]
    pub fn dev_echo_token(&self) -> bool {
        self.dev_echo_token
    }
}
