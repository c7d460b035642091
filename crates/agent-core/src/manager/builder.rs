//! Builder pattern for creating agent managers

use std::sync::Arc;
use std::time::Duration;

use crate::api::CallCenterApi;
use crate::auth::TokenStore;
use crate::bridge::VoipBridge;
use crate::error::{AgentError, AgentResult};

use super::{AgentConfig, AgentManager};

/// Builder for creating an [`AgentManager`] with custom collaborators
///
/// The VoIP bridge is required. Without an explicit API client the builder
/// creates an HTTP client from the configuration (`http-client` feature).
#[derive(Default)]
pub struct AgentManagerBuilder {
    config: AgentConfig,
    bridge: Option<Arc<dyn VoipBridge>>,
    api: Option<Arc<dyn CallCenterApi>>,
    token_store: Option<Arc<dyn TokenStore>>,
}

impl AgentManagerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a complete configuration
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base URL of the call-center API
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    /// Set the presence poll interval
    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.config.status_poll_interval = interval;
        self
    }

    /// Set the go-online watchdog
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the VoIP bridge (required)
    pub fn bridge(mut self, bridge: Arc<dyn VoipBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Use a custom call-center API client
    pub fn api(mut self, api: Arc<dyn CallCenterApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Persist tokens through `store`
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Build the agent manager
    pub fn build(self) -> AgentResult<AgentManager> {
        self.config.validate()?;

        let bridge = self
            .bridge
            .ok_or_else(|| AgentError::config("A VoIP bridge is required"))?;

        let api = match self.api {
            Some(api) => api,
            None => default_api(&self.config)?,
        };

        tracing::debug!(
            api_base_url = %self.config.api_base_url,
            poll_interval_ms = self.config.status_poll_interval.as_millis() as u64,
            "Building agent manager"
        );
        Ok(AgentManager::new(self.config, bridge, api, self.token_store))
    }
}

#[cfg(feature = "http-client")]
fn default_api(config: &AgentConfig) -> AgentResult<Arc<dyn CallCenterApi>> {
    Ok(Arc::new(crate::api::HttpCallCenterApi::from_config(config)?))
}

#[cfg(not(feature = "http-client"))]
fn default_api(_config: &AgentConfig) -> AgentResult<Arc<dyn CallCenterApi>> {
    Err(AgentError::config(
        "No call-center API client configured and the http-client feature is disabled",
    ))
}
