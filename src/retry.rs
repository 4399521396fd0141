//! Retry strategy for bringing an overlay node up.
//!
//! Attempts are retried immediately, without backoff. By default there is no
//! attempt cap, so a node with a revoked key keeps retrying; set
//! `max_attempts` to fail startup instead. Dropping the construction future
//! cancels the loop between attempts.

use std::time::Duration;

use crate::config::{BRING_UP_ATTEMPT_TIMEOUT_SECS, STATUS_TIMEOUT_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpPolicy {
    /// Upper bound for a single bring-up attempt
    pub attempt_timeout: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    /// Upper bound for the status query that resolves the FQDN
    pub status_timeout: Duration,
}

impl Default for BringUpPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(BRING_UP_ATTEMPT_TIMEOUT_SECS),
            max_attempts: None,
            status_timeout: Duration::from_secs(STATUS_TIMEOUT_SECS),
        }
    }
}

impl BringUpPolicy {
    /// Policy that gives up after `attempts` failed attempts.
    pub fn bounded(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            ..Self::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Whether another attempt may follow `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }
}
