//! Executor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Executor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on one invocation, in milliseconds; `None` waits forever
    pub timeout_ms: Option<u64>,
    /// Log every invocation outcome at info level instead of debug
    pub trace_outcomes: bool,
}

impl ExecutorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With invocation timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// With outcome tracing
    #[inline]
    #[must_use]
    pub fn with_trace_outcomes(mut self, enabled: bool) -> Self {
        self.trace_outcomes = enabled;
        self
    }

    /// Configured timeout, if any
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Parse configuration from JSON; absent fields take their defaults
    ///
    /// # Errors
    /// Malformed JSON or mistyped fields.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
