//! Contract of the remote call-center API
//!
//! [`CallCenterApi`] is everything the coordinator and poller need from the
//! backend: session start/stop, outbound dialing, call notifications and the
//! presence status poll. [`HttpCallCenterApi`] implements it over JSON/HTTP
//! with a bearer token.
//!
//! # Endpoints
//!
//! | Operation             | Method | Path                       |
//! |-----------------------|--------|----------------------------|
//! | start session         | POST   | `/agent/session/start`     |
//! | stop session          | POST   | `/agent/session/stop`      |
//! | poll agent status     | GET    | `/agent/status/{agentId}`  |
//! | outbound call         | POST   | `/call/outbound`           |
//! | call accepted         | POST   | `/call/accept`             |
//! | call rejected         | POST   | `/call/reject`             |
//! | call hung up          | POST   | `/call/hangup`             |
//! | transfer call         | POST   | `/call/transfer`           |

use async_trait::async_trait;

use crate::error::AgentResult;
use crate::types::{
    AgentStatusResponse, CallAcceptedNotice, CallHungUpNotice, CallRejectedNotice,
    OutboundCallRequest, OutboundCallResponse, StartSessionResponse, TransferCallRequest,
};

/// Paths of the call-center API, relative to the configured base URL
pub mod endpoints {
    pub const START_SESSION: &str = "/agent/session/start";
    pub const STOP_SESSION: &str = "/agent/session/stop";
    pub const AGENT_STATUS: &str = "/agent/status";
    pub const OUTBOUND_CALL: &str = "/call/outbound";
    pub const ACCEPT_CALL: &str = "/call/accept";
    pub const REJECT_CALL: &str = "/call/reject";
    pub const HANG_UP_CALL: &str = "/call/hangup";
    pub const TRANSFER_CALL: &str = "/call/transfer";
}

/// Remote operations of the call-center backend
///
/// Boolean results carry the backend's `success` flag.
#[async_trait]
pub trait CallCenterApi: Send + Sync {
    /// Replace the bearer token used for subsequent requests
    fn set_auth_token(&self, _token: Option<String>) {}

    /// Open a personal session for the given clinics
    async fn start_session(&self, clinic_ids: &[String]) -> AgentResult<StartSessionResponse>;

    /// Close the agent's personal session
    async fn stop_session(&self) -> AgentResult<bool>;

    /// Dial a customer on behalf of a clinic
    async fn outbound_call(&self, request: &OutboundCallRequest) -> AgentResult<OutboundCallResponse>;

    async fn notify_call_accepted(&self, notice: &CallAcceptedNotice) -> AgentResult<bool>;

    async fn notify_call_rejected(&self, notice: &CallRejectedNotice) -> AgentResult<bool>;

    async fn notify_call_hung_up(&self, notice: &CallHungUpNotice) -> AgentResult<bool>;

    /// Hand the active call to another agent
    async fn transfer_call(&self, request: &TransferCallRequest) -> AgentResult<bool>;

    /// Current presence status as seen by the backend
    async fn poll_agent_status(&self, agent_id: &str) -> AgentResult<AgentStatusResponse>;
}

#[cfg(feature = "http-client")]
pub use http::HttpCallCenterApi;

#[cfg(feature = "http-client")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::RwLock;
    use reqwest::{Client, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tracing::{debug, warn};

    use super::{endpoints, CallCenterApi};
    use crate::error::{AgentError, AgentResult};
    use crate::manager::config::AgentConfig;
    use crate::types::{
        AgentStatusResponse, CallAcceptedNotice, CallHungUpNotice, CallRejectedNotice,
        OutboundCallRequest, OutboundCallResponse, StartSessionResponse, TransferCallRequest,
    };

    #[derive(Debug, Deserialize)]
    struct SuccessResponse {
        #[serde(default)]
        success: bool,
    }

    /// [`CallCenterApi`] over JSON/HTTP
    #[derive(Debug)]
    pub struct HttpCallCenterApi {
        client: Client,
        base_url: String,
        token: RwLock<Option<String>>,
    }

    impl HttpCallCenterApi {
        /// Create a client for the given base URL with a per-request timeout
        pub fn new(base_url: impl Into<String>, timeout: Duration) -> AgentResult<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| AgentError::config(format!("Failed to build HTTP client: {}", e)))?;

            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                token: RwLock::new(None),
            })
        }

        /// Create a client from the agent configuration
        pub fn from_config(config: &AgentConfig) -> AgentResult<Self> {
            config.validate()?;
            Self::new(config.api_base_url.clone(), config.request_timeout)
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn endpoint(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
            match self.token.read().as_deref() {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        }

        async fn execute<R: DeserializeOwned>(
            &self,
            operation: &'static str,
            request: RequestBuilder,
        ) -> AgentResult<R> {
            let response = self.authorized(request).send().await?;
            let response = Self::check_status(operation, response).await?;
            Ok(response.json::<R>().await?)
        }

        async fn execute_success(
            &self,
            operation: &'static str,
            request: RequestBuilder,
        ) -> AgentResult<bool> {
            let body: SuccessResponse = self.execute(operation, request).await?;
            if !body.success {
                warn!(operation, "Call API reported success=false");
            }
            Ok(body.success)
        }

        /// Map non-2xx responses to `"<status> <reason>: <details>"`
        async fn check_status(operation: &'static str, response: Response) -> AgentResult<Response> {
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let reason = status.canonical_reason().unwrap_or("");
            let text = response.text().await.unwrap_or_default();
            let details = match serde_json::from_str::<Value>(&text) {
                Ok(Value::String(s)) => Some(s),
                Ok(body) => body
                    .get("error")
                    .or_else(|| body.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                Err(_) if !text.trim().is_empty() => Some(text.trim().to_string()),
                Err(_) => None,
            };

            let message = match details {
                Some(details) => format!("{} {}: {}", status.as_u16(), reason, details),
                None => format!("{} {}", status.as_u16(), reason),
            };
            debug!(operation, %message, "Call API request failed");
            Err(AgentError::api(operation, message.trim_end().to_string()))
        }
    }

    #[async_trait]
    impl CallCenterApi for HttpCallCenterApi {
        fn set_auth_token(&self, token: Option<String>) {
            *self.token.write() = token;
        }

        async fn start_session(&self, clinic_ids: &[String]) -> AgentResult<StartSessionResponse> {
            let request = self
                .client
                .post(self.endpoint(endpoints::START_SESSION))
                .json(&json!({ "clinicIds": clinic_ids }));
            self.execute("start_session", request).await
        }

        async fn stop_session(&self) -> AgentResult<bool> {
            let request = self.client.post(self.endpoint(endpoints::STOP_SESSION));
            self.execute_success("stop_session", request).await
        }

        async fn outbound_call(&self, request: &OutboundCallRequest) -> AgentResult<OutboundCallResponse> {
            let request = self
                .client
                .post(self.endpoint(endpoints::OUTBOUND_CALL))
                .json(request);
            self.execute("outbound_call", request).await
        }

        async fn notify_call_accepted(&self, notice: &CallAcceptedNotice) -> AgentResult<bool> {
            let request = self.client.post(self.endpoint(endpoints::ACCEPT_CALL)).json(notice);
            self.execute_success("notify_call_accepted", request).await
        }

        async fn notify_call_rejected(&self, notice: &CallRejectedNotice) -> AgentResult<bool> {
            let request = self.client.post(self.endpoint(endpoints::REJECT_CALL)).json(notice);
            self.execute_success("notify_call_rejected", request).await
        }

        async fn notify_call_hung_up(&self, notice: &CallHungUpNotice) -> AgentResult<bool> {
            let request = self.client.post(self.endpoint(endpoints::HANG_UP_CALL)).json(notice);
            self.execute_success("notify_call_hung_up", request).await
        }

        async fn transfer_call(&self, request: &TransferCallRequest) -> AgentResult<bool> {
            let request = self
                .client
                .post(self.endpoint(endpoints::TRANSFER_CALL))
                .json(request);
            self.execute_success("transfer_call", request).await
        }

        async fn poll_agent_status(&self, agent_id: &str) -> AgentResult<AgentStatusResponse> {
            let url = format!("{}/{}", self.endpoint(endpoints::AGENT_STATUS), agent_id);
            self.execute("poll_agent_status", self.client.get(url)).await
        }
    }
}
