//! Polling configuration for repository listeners.
//!
//! Each iteration receives one batch. With long polling on, an empty queue
//! holds the receive call open for up to 20 seconds, which is what keeps an
//! idle listener cheap. `poll_interval` adds a sleep between iterations on
//! top of that; it defaults to zero.

use std::time::Duration;

use crate::channel::ReceiveRequest;
use crate::config::RepositoryConfig;

/// Longest wait SQS allows for a long-poll receive.
pub const LONG_POLL_WAIT: Duration = Duration::from_secs(20);

/// Configuration for a listener's poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Hold receive calls open on an empty queue.
    ///
    /// Default: on.
    pub long_poll: bool,

    /// Sleep between iterations.
    ///
    /// Default: zero.
    pub poll_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    /// Creates a `PollConfig` with default values.
    pub fn new() -> Self {
        PollConfig {
            long_poll: true,
            poll_interval: Duration::ZERO,
        }
    }

    /// Takes the interval from a repository's configuration.
    pub fn from_config(config: &RepositoryConfig, long_poll: bool) -> Self {
        PollConfig {
            long_poll,
            poll_interval: config.poll_interval,
        }
    }
}

/// A full batch, long-polling if `wait` is set.
pub fn receive_request(wait: bool) -> ReceiveRequest {
    ReceiveRequest::batch(wait.then_some(LONG_POLL_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_long_polls_without_sleeping() {
        let config = PollConfig::new();
        assert!(config.long_poll);
        assert_eq!(config.poll_interval, Duration::ZERO);
    }

    #[test]
    fn wait_selects_long_poll() {
        assert_eq!(receive_request(true).wait, Some(Duration::from_secs(20)));
        assert_eq!(receive_request(false).wait, None);
        assert_eq!(receive_request(false).max_messages, 10);
    }
}
