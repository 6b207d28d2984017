//! Session store configuration.

use std::time::Duration;

/// Configuration for session retention.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session that has never started may sit in the lobby
    /// before the reclamation sweep deletes it.
    ///
    /// Default: 30 minutes. Sessions that have run at least one round are
    /// never reclaimed this way; they live until their roster empties.
    pub idle_retention: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_retention: Duration::from_secs(30 * 60),
        }
    }
}
