//! # Call-center agent core
//!
//! Presence and call lifecycle coordination for a single call-center agent
//! on a softphone client.
//!
//! The crate tracks whether the agent is online, detects inbound calls by
//! polling the backend, and drives the lifecycle of the one call the agent can
//! have: accept, reject, hang up, dial out and transfer. The media itself is
//! handled by an external VoIP SDK behind the [`VoipBridge`] trait, and the
//! backend is reached through the [`CallCenterApi`] trait.
//!
//! ## Components
//!
//! - [`AgentManager`] - the call lifecycle coordinator, sole owner of the bridge
//! - [`presence::PresencePoller`] - periodic status poll feeding the coordinator
//! - [`store::AgentStore`] - injected agent state with atomic transitions
//! - [`events`] - broadcast stream of status changes, calls and notices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callcenter_agent_core::{AgentEvent, AgentManager, VoipBridge};
//!
//! async fn run(bridge: Arc<dyn VoipBridge>, token: String) -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = AgentManager::builder().bridge(bridge).build()?;
//!     manager.set_auth_token(Some(token)).await?;
//!
//!     let clinics: Vec<String> = manager
//!         .available_clinics()
//!         .into_iter()
//!         .map(|clinic| clinic.clinic_id)
//!         .collect();
//!     manager.go_online(&clinics).await?;
//!
//!     let mut events = manager.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let AgentEvent::IncomingCall(_) = event {
//!             manager.accept_call().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod bridge;
pub mod error;
pub mod events;
pub mod manager;
pub mod presence;
pub mod store;
pub mod types;

// Re-export main types
pub use api::CallCenterApi;
#[cfg(feature = "http-client")]
pub use api::HttpCallCenterApi;
pub use auth::{AgentIdentity, Clinic, MemoryTokenStore, TokenStore};
pub use bridge::{BridgeEvent, VoipBridge};
pub use error::{AgentError, AgentResult};
pub use events::{AgentEvent, EventStream, Notice, NoticeSeverity};
pub use manager::{AgentConfig, AgentManager, AgentManagerBuilder};
pub use presence::{PollOutcome, PresencePoller};
pub use types::{
    AgentStatus, AudioDevice, AudioDevices, CallDirection, CallSession, CallStatus, IncomingCall,
    PersonalSession,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
