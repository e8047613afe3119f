use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How long [`invoke`](crate::Dispatcher::invoke) waits for the
    /// hub's completion before failing with a timeout.
    pub reply_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatchConfig {
    /// Smallest accepted reply timeout.
    pub const MIN_REPLY_TIMEOUT: Duration = Duration::from_millis(1);

    /// Config with the given reply timeout.
    pub fn with_reply_timeout(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }

    /// Raises a zero reply timeout to [`Self::MIN_REPLY_TIMEOUT`].
    pub fn validated(mut self) -> Self {
        if self.reply_timeout < Self::MIN_REPLY_TIMEOUT {
            self.reply_timeout = Self::MIN_REPLY_TIMEOUT;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_raises_zero_timeout() {
        let config = DispatchConfig::with_reply_timeout(Duration::ZERO).validated();
        assert_eq!(config.reply_timeout, DispatchConfig::MIN_REPLY_TIMEOUT);
    }

    #[test]
    fn test_default_is_valid() {
        let config = DispatchConfig::default();
        assert_eq!(config.clone().validated(), config);
    }
}
