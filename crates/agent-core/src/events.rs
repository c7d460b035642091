//! Events published by the agent manager
//!
//! Every user-visible message the coordinator produces (success toasts,
//! connection failures, incoming call prompts, warnings) is published as an
//! [`AgentEvent::Notice`], next to the state change events a UI needs to
//! re-render.
//!
//! # Usage Examples
//!
//! ```rust
//! use callcenter_agent_core::events::{Notice, NoticeSeverity};
//!
//! let notice = Notice::warning("Warning", "Server error stopping session.");
//! assert_eq!(notice.severity, NoticeSeverity::Warning);
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::types::{AgentStatus, AudioDevices, CallSession, IncomingCall};

/// Severity of a user-visible notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// A message meant for the agent, typically rendered as an alert or toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(severity: NoticeSeverity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeSeverity::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeSeverity::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeSeverity::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeSeverity::Error, title, message)
    }
}

/// Events emitted by the agent manager and presence poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Agent status changed
    StatusChanged {
        previous: AgentStatus,
        current: AgentStatus,
    },
    /// An inbound call is ringing for this agent
    IncomingCall(IncomingCall),
    /// A call session became active (accepted or dialed)
    CallStarted(CallSession),
    /// A dialed outbound call was answered by the callee
    CallConnected(CallSession),
    /// The active call session ended on this agent's side
    CallEnded {
        call_id: String,
        duration_secs: u64,
    },
    /// Local mute state changed
    MuteChanged { muted: bool },
    /// Audio device list was refreshed
    DevicesChanged(AudioDevices),
    /// Message for the agent
    Notice(Notice),
}

/// Stream of agent events for UI integration
pub type EventStream = BroadcastStream<AgentEvent>;

/// Cloneable publisher shared by the coordinator and the poller
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            debug!("No subscribers for agent event");
        }
    }

    /// Publish a user-visible notice
    pub fn notify(&self, notice: Notice) {
        self.publish(AgentEvent::Notice(notice));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.tx.subscribe())
    }
}
