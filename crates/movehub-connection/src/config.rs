//! Connection configuration: timeouts and the reconnection policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// How the connection retries after an unexpected drop.
///
/// Attempt `n` (starting at 1) waits
/// `min(initial_delay * multiplier^(n-1), max_delay)`, then spreads that
/// by up to `±jitter` so a fleet of clients dropped by the same hub
/// restart doesn't reconnect in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// `false` turns reconnection off: a drop ends in `Disconnected`.
    pub enabled: bool,

    /// Delay before the first attempt.
    pub initial_delay: Duration,

    /// Growth factor between attempts. Values below 1.0 are raised to 1.0.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Relative jitter in `0.0..=1.0`. 0.0 gives exact delays.
    pub jitter: f64,

    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: Some(8),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Longest accepted `initial_delay` or `max_delay`.
    pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Clamp out-of-range values so the policy is safe to use.
    ///
    /// - delays capped at [`MAX_DELAY`](Self::MAX_DELAY).
    /// - `multiplier` below 1.0 (or NaN) becomes 1.0.
    /// - `jitter` clamped to `0.0..=1.0` (NaN becomes 0.0).
    /// - `max_delay` raised to at least `initial_delay`.
    pub fn validated(mut self) -> Self {
        self.initial_delay = self.initial_delay.min(Self::MAX_DELAY);
        self.max_delay = self.max_delay.min(Self::MAX_DELAY);
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            warn!(multiplier = self.multiplier, "reconnect multiplier below 1.0, using 1.0");
            self.multiplier = 1.0;
        }
        self.jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        if self.max_delay < self.initial_delay {
            warn!(
                max_delay = ?self.max_delay,
                initial_delay = ?self.initial_delay,
                "max_delay below initial_delay, raising it"
            );
            self.max_delay = self.initial_delay;
        }
        self
    }

    /// Backoff delay before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let spread = if self.jitter > 0.0 {
            rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let jittered = (capped * (1.0 + spread)).clamp(0.0, self.max_delay.as_secs_f64());
        // NaN or out of range only with an unvalidated policy.
        Duration::try_from_secs_f64(jittered).unwrap_or(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hub URL. `http(s)://` is mapped to `ws(s)://` by the WebSocket
    /// connector.
    pub url: String,

    /// How long to wait for the hub's handshake acknowledgement.
    pub handshake_timeout: Duration,

    /// Interval between outbound `Ping` frames.
    pub keep_alive_interval: Duration,

    /// The connection is considered lost when nothing at all arrives
    /// from the hub for this long. Kept at least twice the keep-alive
    /// interval.
    pub server_timeout: Duration,

    /// What to do after an unexpected drop.
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/hub".into(),
            handshake_timeout: Duration::from_secs(15),
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Smallest accepted handshake timeout and keep-alive interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Longest accepted handshake timeout, keep-alive interval or server
    /// timeout.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Config for `url` with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`Connection::new`](crate::Connection::new).
    pub fn validated(mut self) -> Self {
        self.handshake_timeout = self
            .handshake_timeout
            .clamp(Self::MIN_INTERVAL, Self::MAX_INTERVAL);
        self.keep_alive_interval = self
            .keep_alive_interval
            .clamp(Self::MIN_INTERVAL, Self::MAX_INTERVAL);
        self.server_timeout = self.server_timeout.min(Self::MAX_INTERVAL);
        let floor = self
            .keep_alive_interval
            .checked_mul(2)
            .unwrap_or(Duration::MAX);
        if self.server_timeout < floor {
            warn!(
                server_timeout = ?self.server_timeout,
                keep_alive = ?self.keep_alive_interval,
                "server_timeout shorter than two keep-alive intervals, raising it"
            );
            self.server_timeout = floor;
        }
        self.reconnect = self.reconnect.validated();
        self
    }
}
