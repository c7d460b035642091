//! Call lifecycle coordinator
//!
//! [`AgentManager`] is the single owner of the VoIP bridge, the personal
//! session and the active call. Its operations are split by concern:
//!
//! - `session.rs` - going online and offline
//! - `calls.rs` - accept, reject, hang up, dial, transfer
//! - `audio.rs` - mute and audio device routing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │     UI / Application    │
//! └───────────┬─────────────┘
//!             │ operations          ▲ AgentEvent stream
//! ┌───────────▼─────────────────────┴─┐
//! │           AgentManager            │
//! │  ┌────────────┐  ┌─────────────┐  │
//! │  │ AgentStore │◄─┤PresencePoller│ │
//! │  └────────────┘  └──────┬──────┘  │
//! └──────┬──────────────────┼─────────┘
//!        │                  │
//! ┌──────▼──────┐   ┌───────▼────────┐
//! │ VoipBridge  │   │ CallCenterApi  │
//! └─────────────┘   └────────────────┘
//! ```
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callcenter_agent_core::{AgentConfig, AgentManager, VoipBridge};
//!
//! async fn example(bridge: Arc<dyn VoipBridge>, token: String) -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = AgentManager::builder()
//!         .config(AgentConfig::default())
//!         .bridge(bridge)
//!         .build()?;
//!
//!     manager.set_auth_token(Some(token)).await?;
//!     manager.go_online(&["dentistinAustin".to_string()]).await?;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod builder;
pub mod calls;
pub mod config;
pub mod session;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::CallCenterApi;
use crate::auth::{AgentIdentity, Clinic, TokenStore};
use crate::bridge::{BridgeEvent, VoipBridge};
use crate::error::AgentResult;
use crate::events::{AgentEvent, EventStream, Notice};
use crate::presence::{PollOutcome, PresencePoller};
use crate::store::AgentStore;
use crate::types::{AgentStatus, AudioDevice, CallSession, IncomingCall, PersonalSession};

pub use builder::AgentManagerBuilder;
pub use config::AgentConfig;

/// Coordinates presence, the personal session and the single active call
pub struct AgentManager {
    pub(crate) config: AgentConfig,
    pub(crate) store: AgentStore,
    pub(crate) poller: PresencePoller,
    pub(crate) bridge: Arc<dyn VoipBridge>,
    pub(crate) api: Arc<dyn CallCenterApi>,
    pub(crate) token_store: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("status", &self.status())
            .field("agent_id", &self.agent_id())
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl AgentManager {
    pub fn builder() -> AgentManagerBuilder {
        AgentManagerBuilder::new()
    }

    pub(crate) fn new(
        config: AgentConfig,
        bridge: Arc<dyn VoipBridge>,
        api: Arc<dyn CallCenterApi>,
        token_store: Option<Arc<dyn TokenStore>>,
    ) -> Self {
        let store = AgentStore::new(crate::events::EventBus::new(config.event_channel_capacity));
        let poller = PresencePoller::new(store.clone(), Arc::clone(&api), config.status_poll_interval);
        Self {
            config,
            store,
            poller,
            bridge,
            api,
            token_store,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    // ===== AUTHENTICATION =====

    /// Replace the bearer token and recompute the agent identity
    ///
    /// `None` signs the agent out of the core. A token that cannot be decoded
    /// leaves the agent unauthenticated and returns the decode error.
    pub async fn set_auth_token(&self, token: Option<String>) -> AgentResult<()> {
        self.api.set_auth_token(token.clone());

        let Some(token) = token else {
            self.store.update(|state| state.identity = None);
            debug!("Auth token cleared");
            return Ok(());
        };

        match AgentIdentity::from_token(&token) {
            Ok(identity) => {
                info!(
                    agent_id = %identity.agent_id,
                    clinics = identity.clinics.len(),
                    "Agent identity loaded from token"
                );
                self.store.update(|state| state.identity = Some(identity));
                Ok(())
            }
            Err(e) => {
                error!("Failed to parse auth token: {}", e);
                self.store.update(|state| state.identity = None);
                Err(e)
            }
        }
    }

    /// Load a previously saved token from the token store, if any
    ///
    /// Returns whether an identity was restored.
    pub async fn restore_token(&self) -> AgentResult<bool> {
        let Some(token_store) = &self.token_store else {
            return Ok(false);
        };
        match token_store.load().await? {
            Some(token) => {
                self.set_auth_token(Some(token)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist a freshly issued token and adopt it
    pub async fn sign_in(&self, token: String) -> AgentResult<()> {
        self.set_auth_token(Some(token.clone())).await?;
        if let Some(token_store) = &self.token_store {
            token_store.save(&token).await?;
        }
        Ok(())
    }

    /// Go offline if needed, then forget the token
    pub async fn sign_out(&self) -> AgentResult<()> {
        if !matches!(self.status(), AgentStatus::Offline | AgentStatus::Connecting) {
            self.go_offline().await?;
        }
        if let Some(token_store) = &self.token_store {
            token_store.clear().await?;
        }
        self.set_auth_token(None).await
    }

    // ===== EVENTS =====

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.store.events().subscribe()
    }

    pub fn event_stream(&self) -> EventStream {
        self.store.events().stream()
    }

    /// Apply one out-of-band notification from the VoIP bridge
    pub fn handle_bridge_event(&self, event: BridgeEvent) {
        apply_bridge_event(&self.store, event);
    }

    /// Drive [`handle_bridge_event`](Self::handle_bridge_event) from a stream
    ///
    /// The returned task ends when the stream does.
    pub fn attach_bridge_events<S>(&self, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = BridgeEvent> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                apply_bridge_event(&store, event);
            }
            debug!("Bridge event stream ended");
        })
    }

    // ===== PRESENCE =====

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Poll the backend once, outside the periodic schedule
    pub async fn refresh_status(&self) -> PollOutcome {
        self.poller.poll_now().await
    }

    // ===== ACCESSORS =====

    pub fn status(&self) -> AgentStatus {
        self.store.status()
    }

    pub fn agent_id(&self) -> Option<String> {
        self.store
            .with(|state| state.identity.as_ref().map(|identity| identity.agent_id.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.with(|state| state.identity.is_some())
    }

    /// Clinics the agent may go online for
    pub fn available_clinics(&self) -> Vec<Clinic> {
        self.store.with(|state| {
            state
                .identity
                .as_ref()
                .map(|identity| identity.clinics.clone())
                .unwrap_or_default()
        })
    }

    pub fn incoming_call(&self) -> Option<IncomingCall> {
        self.store.with(|state| state.incoming_call.clone())
    }

    pub fn active_call(&self) -> Option<CallSession> {
        self.store.with(|state| state.active_call.clone())
    }

    pub fn personal_session(&self) -> Option<PersonalSession> {
        self.store.with(|state| state.personal_session.clone())
    }

    /// Whether the bridge is joined to the personal meeting
    pub fn is_connected(&self) -> bool {
        self.store.with(|state| state.bridge_connected)
    }

    pub fn is_muted(&self) -> bool {
        self.store.with(|state| state.muted)
    }

    pub fn audio_inputs(&self) -> Vec<AudioDevice> {
        self.store.with(|state| state.audio_devices.input_devices.clone())
    }

    pub fn audio_outputs(&self) -> Vec<AudioDevice> {
        self.store.with(|state| state.audio_devices.output_devices.clone())
    }

    pub fn selected_input(&self) -> Option<String> {
        self.store.with(|state| state.selected_input.clone())
    }

    pub fn selected_output(&self) -> Option<String> {
        self.store.with(|state| state.selected_output.clone())
    }

    /// Identity of the signed-in agent, or `NotAuthenticated`
    pub(crate) fn require_identity(&self, operation: &'static str) -> AgentResult<AgentIdentity> {
        self.store
            .with(|state| state.identity.clone())
            .ok_or_else(|| {
                warn!(operation, "Rejected: agent is not authenticated");
                crate::error::AgentError::NotAuthenticated
            })
    }
}

fn apply_bridge_event(store: &AgentStore, event: BridgeEvent) {
    match event {
        BridgeEvent::MeetingStarted { meeting_id } => {
            info!(meeting_id = ?meeting_id, "Bridge meeting started");
            store.update(|state| state.bridge_connected = true);
        }
        BridgeEvent::MeetingEnded { meeting_id } => {
            info!(meeting_id = ?meeting_id, "Bridge meeting ended");
            store.update(|state| state.bridge_connected = false);
        }
        BridgeEvent::AudioStatusChanged { muted } => {
            let changed = store.update(|state| std::mem::replace(&mut state.muted, muted) != muted);
            if changed {
                store.events().publish(AgentEvent::MuteChanged { muted });
            }
        }
        BridgeEvent::DeviceChanged {
            input_device,
            output_device,
        } => {
            debug!(input = ?input_device, output = ?output_device, "Bridge audio route changed");
            store.update(|state| {
                if input_device.is_some() {
                    state.selected_input = input_device;
                }
                if output_device.is_some() {
                    state.selected_output = output_device;
                }
            });
        }
        BridgeEvent::Error { code, message } => {
            error!(%code, %message, "Bridge reported an error");
            let message = if message.is_empty() {
                "An error occurred with the call".to_string()
            } else {
                message
            };
            store.events().notify(Notice::error("Call Error", message));
        }
    }
}
