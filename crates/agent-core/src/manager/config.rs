//! Configuration for the agent manager
//!
//! # Usage Examples
//!
//! ```rust
//! use callcenter_agent_core::AgentConfig;
//! use std::time::Duration;
//!
//! let config = AgentConfig::new()
//!     .with_api_base_url("https://voice.example.com")
//!     .with_status_poll_interval(Duration::from_secs(3))
//!     .with_connection_timeout(Duration::from_secs(20));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.status_poll_interval, Duration::from_secs(3));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AgentError, AgentResult};

/// Default base URL of the voice API
pub const DEFAULT_API_BASE_URL: &str = "https://api.todaysdentalinsights.com/voice";

/// Default period between presence polls
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default go-online watchdog
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for presence polling, connection timeouts and the HTTP API
///
/// Durations are serialized as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the call-center API
    pub api_base_url: String,

    /// Timeout applied to every HTTP request
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,

    /// Fixed period between presence polls; the first poll is immediate
    #[serde(rename = "status_poll_interval_ms", with = "duration_ms")]
    pub status_poll_interval: Duration,

    /// How long going online may stay in `Connecting` before reverting
    #[serde(rename = "connection_timeout_ms", with = "duration_ms")]
    pub connection_timeout: Duration,

    /// Buffer size of the event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            event_channel_capacity: 256,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Check that durations are non-zero and the base URL is http(s)
    pub fn validate(&self) -> AgentResult<()> {
        if self.request_timeout.is_zero() {
            return Err(AgentError::config("request_timeout must be greater than zero"));
        }
        if self.status_poll_interval.is_zero() {
            return Err(AgentError::config("status_poll_interval must be greater than zero"));
        }
        if self.connection_timeout.is_zero() {
            return Err(AgentError::config("connection_timeout must be greater than zero"));
        }
        if self.event_channel_capacity == 0 {
            return Err(AgentError::config("event_channel_capacity must be greater than zero"));
        }

        let url = Url::parse(&self.api_base_url).map_err(|e| {
            AgentError::config(format!("Invalid api_base_url '{}': {}", self.api_base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(AgentError::config(format!(
                "api_base_url must use http or https, got '{}'",
                other
            ))),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
