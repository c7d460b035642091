//! Type definitions for agent presence and call sessions
//!
//! This module contains the data model shared by the presence poller, the
//! call lifecycle coordinator and the collaborator contracts (VoIP bridge and
//! remote call API).
//!
//! # Type Categories
//!
//! - **Presence** - [`AgentStatus`]
//! - **Calls** - [`CallSession`], [`CallDirection`], [`CallStatus`], [`IncomingCall`]
//! - **Session credentials** - [`PersonalSession`], [`MeetingInfo`], [`AttendeeInfo`]
//! - **Audio devices** - [`AudioDevice`], [`AudioDevices`]
//! - **Wire payloads** - request/response bodies of the remote call API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== PRESENCE =====

/// Presence status of the single agent using this client
///
/// Exactly one value is current at a time. The serialized names match the
/// status strings the call-center backend reports.
///
/// # State Transitions
///
/// `Offline` → `Connecting` → `Online` → `Ringing` → `InCall` → `Online` → ... → `Offline`
///
/// `AfterCallWork` and `Away` are only ever adopted from the server; `Error`
/// is entered when a presence poll fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    /// Not joined to a meeting, not polling
    #[default]
    Offline,
    /// Transitional: going online, going offline or hanging up
    Connecting,
    /// Ready to receive or place calls
    Online,
    /// Inbound call offered, or outbound call dialing
    Ringing,
    /// Connected call in progress
    #[serde(rename = "In Call")]
    InCall,
    /// Wrap-up after a call, set by the backend
    #[serde(rename = "After Call Work")]
    AfterCallWork,
    /// Temporarily unavailable, set by the backend
    Away,
    /// Presence polling failed
    Error,
}

impl AgentStatus {
    /// Wire representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Offline => "Offline",
            AgentStatus::Connecting => "Connecting",
            AgentStatus::Online => "Online",
            AgentStatus::Ringing => "Ringing",
            AgentStatus::InCall => "In Call",
            AgentStatus::AfterCallWork => "After Call Work",
            AgentStatus::Away => "Away",
            AgentStatus::Error => "Error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===== CALLS =====

/// Direction of a call relative to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Customer called the clinic and the call was routed to this agent
    Inbound,
    /// Agent dialed out on behalf of a clinic
    Outbound,
}

/// Lifecycle state of a [`CallSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Outbound call is dialing
    Ringing,
    /// Both parties are connected
    Connected,
    /// Call has finished
    Ended,
}

/// The single call in progress, owned by the coordinator
///
/// Created when an inbound call is accepted or an outbound call is dialed,
/// and dropped on hangup, transfer or failure cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    /// Server-issued call identifier
    pub call_id: String,
    /// Inbound or outbound
    pub direction: CallDirection,
    /// Calling party (phone number, or clinic id for outbound calls)
    pub from: String,
    /// Called party
    pub to: String,
    /// Current call status
    pub status: CallStatus,
    /// When the call became active
    pub start_time: DateTime<Utc>,
}

impl CallSession {
    /// Whole seconds elapsed since the call became active
    pub fn duration_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_seconds().max(0) as u64
    }
}

/// An inbound call offered to the agent, detected by the presence poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    /// Server-issued call identifier
    pub call_id: String,
    /// Caller number, `Unknown` when the server does not report it
    pub from: String,
}

// ===== SESSION CREDENTIALS =====

/// Media placement URLs of a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaPlacement {
    pub audio_host_url: String,
    pub signaling_url: String,
    pub turn_control_url: String,
}

/// Meeting credentials handed to the VoIP bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeetingInfo {
    pub meeting_id: String,
    pub media_region: String,
    pub media_placement: MediaPlacement,
}

/// Attendee credentials handed to the VoIP bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttendeeInfo {
    pub attendee_id: String,
    pub join_token: String,
}

/// Server response to "start session"
///
/// Both parts are optional on the wire so that a malformed response can be
/// rejected explicitly instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    #[serde(default)]
    pub meeting: Option<MeetingInfo>,
    #[serde(default)]
    pub attendee: Option<AttendeeInfo>,
}

/// Server-issued meeting and attendee credentials held while online
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalSession {
    pub meeting: MeetingInfo,
    pub attendee: AttendeeInfo,
}

impl TryFrom<StartSessionResponse> for PersonalSession {
    type Error = crate::error::AgentError;

    fn try_from(response: StartSessionResponse) -> Result<Self, Self::Error> {
        match (response.meeting, response.attendee) {
            (Some(meeting), Some(attendee)) => Ok(Self { meeting, attendee }),
            (None, _) => Err(crate::error::AgentError::InvalidSessionData {
                reason: "missing meeting".to_string(),
            }),
            (_, None) => Err(crate::error::AgentError::InvalidSessionData {
                reason: "missing attendee".to_string(),
            }),
        }
    }
}

// ===== AUDIO DEVICES =====

/// An audio input or output device reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    pub device_id: String,
    pub label: String,
}

/// Input and output devices reported by the bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevices {
    pub input_devices: Vec<AudioDevice>,
    pub output_devices: Vec<AudioDevice>,
}

// ===== WIRE PAYLOADS =====

/// Body of `POST /call/outbound`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallRequest {
    pub to_phone_number: String,
    pub from_clinic_id: String,
}

/// Response of `POST /call/outbound`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallResponse {
    pub call_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

/// Body of `POST /call/accept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAcceptedNotice {
    pub call_id: String,
    pub agent_id: String,
}

/// Body of `POST /call/reject`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRejectedNotice {
    pub call_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of `POST /call/hangup`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHungUpNotice {
    pub call_id: String,
    pub agent_id: String,
    /// Call duration in whole seconds
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of `POST /call/transfer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCallRequest {
    pub call_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
}

/// Response of `GET /agent/status/{agentId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusResponse {
    pub status: AgentStatus,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub current_call_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub clinic_ids: Vec<String>,
}

impl AgentStatusResponse {
    /// Response carrying only a status
    pub fn with_status(status: AgentStatus) -> Self {
        Self {
            status,
            agent_id: None,
            current_call_id: None,
            from: None,
            clinic_ids: Vec::new(),
        }
    }

    /// Ringing response for an inbound call
    pub fn ringing(call_id: impl Into<String>, from: Option<String>) -> Self {
        Self {
            current_call_id: Some(call_id.into()),
            from,
            ..Self::with_status(AgentStatus::Ringing)
        }
    }
}
