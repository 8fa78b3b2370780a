//! Session configuration and defaults.
//!
//! Configuration is an explicit, immutable struct threaded into session
//! creation. The only environment-derived value, the application scope, is
//! resolved once by [`SessionConfig::from_env`] at construction time; there
//! is no ambient global state.

use crate::core::backoff::ExponentialBackoff;
use crate::core::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted by [`SessionConfig::from_env`] for the
/// application scope.
pub const SCOPE_ENV: &str = "TETHER_SCOPE";

fn default_session_timeout_ms() -> u64 {
    60_000
}

fn default_stream_buffer() -> usize {
    64
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    8
}

/// Retry policy bounds for transport-transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Total attempts per dispatch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// Build the backoff policy for these bounds.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Configuration for a session.
///
/// All options are independently settable through the `with_*` builders.
/// There are no hidden defaults beyond the ones documented per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Application scope qualifying primitive names. Defaults to empty.
    #[serde(default)]
    pub scope: String,

    /// Session lifetime negotiated with the server, in milliseconds.
    /// The keepalive driver must renew strictly before this elapses.
    /// Defaults to one minute.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Keepalive interval override in milliseconds. When unset, one third
    /// of the session timeout is used, tolerating two missed round trips
    /// before expiry.
    #[serde(default)]
    pub keepalive_interval_ms: Option<u64>,

    /// Per-call deadline in milliseconds. When unset, dispatches wait
    /// indefinitely for a definitive response.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    /// Retry policy for transport-transient failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Delivery conduit capacity for event stream relays. A full conduit
    /// blocks the relay rather than dropping events.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: String::new(),
            session_timeout_ms: default_session_timeout_ms(),
            keepalive_interval_ms: None,
            call_timeout_ms: None,
            retry: RetryConfig::default(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with the scope resolved from the environment.
    ///
    /// This is the one-time resolution step replacing ambient environment
    /// lookups; the resulting configuration is immutable thereafter.
    pub fn from_env() -> Self {
        Self {
            scope: std::env::var(SCOPE_ENV).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Set the application scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the keepalive interval explicitly.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    /// Set the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the retry policy bounds.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the stream delivery conduit capacity.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    /// Get the session timeout as a duration.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Get the effective keepalive interval.
    pub fn keepalive_interval(&self) -> Duration {
        match self.keepalive_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(self.session_timeout_ms / 3),
        }
    }

    /// Get the per-call deadline, if configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SessionResult<()> {
        if self.session_timeout_ms == 0 {
            return Err(SessionError::invalid_argument(
                "session timeout must be positive",
            ));
        }
        if self.keepalive_interval().is_zero() {
            return Err(SessionError::invalid_argument(
                "keepalive interval must be positive",
            ));
        }
        if self.keepalive_interval() >= self.session_timeout() {
            return Err(SessionError::invalid_argument(
                "keepalive interval must be strictly less than the session timeout",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SessionError::invalid_argument(
                "retry attempts must be at least one",
            ));
        }
        if self.stream_buffer == 0 {
            return Err(SessionError::invalid_argument(
                "stream buffer must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_timeout(), Duration::from_secs(60));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(20));
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn builders_set_each_option() {
        let config = SessionConfig::default()
            .with_scope("orders")
            .with_session_timeout(Duration::from_secs(30))
            .with_keepalive_interval(Duration::from_secs(5))
            .with_call_timeout(Duration::from_secs(2))
            .with_stream_buffer(8);
        assert_eq!(config.scope, "orders");
        assert_eq!(config.session_timeout(), Duration::from_secs(30));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(5));
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.stream_buffer, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn keepalive_must_undercut_timeout() {
        let config = SessionConfig::default()
            .with_session_timeout(Duration::from_secs(10))
            .with_keepalive_interval(Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = SessionConfig::default().with_session_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = SessionConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn scope_resolves_from_env_once() {
        std::env::set_var(SCOPE_ENV, "test-scope");
        let config = SessionConfig::from_env();
        std::env::remove_var(SCOPE_ENV);
        assert_eq!(config.scope, "test-scope");
    }
}
