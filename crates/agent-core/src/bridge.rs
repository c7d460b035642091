//! Contract of the native VoIP bridge
//!
//! The bridge wraps the vendor meeting SDK on the device. The call core treats
//! it as an opaque capability: every operation is async and either succeeds
//! or fails, and out-of-band notifications arrive as [`BridgeEvent`]s.
//!
//! Only the coordinator ([`crate::AgentManager`]) holds a reference to the
//! bridge; the presence poller never touches it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;
use crate::types::{AttendeeInfo, AudioDevices, MeetingInfo};

/// Audio and meeting control exposed by the native SDK
///
/// Boolean results mirror the native module: `Ok(false)` means the SDK
/// declined the request without raising an error.
#[async_trait]
pub trait VoipBridge: Send + Sync {
    /// Join the agent's personal meeting
    async fn join_meeting(&self, meeting: &MeetingInfo, attendee: &AttendeeInfo) -> AgentResult<bool>;

    /// Leave the current meeting
    async fn leave_meeting(&self) -> AgentResult<bool>;

    /// Mute the local microphone
    async fn mute(&self) -> AgentResult<bool>;

    /// Unmute the local microphone
    async fn unmute(&self) -> AgentResult<bool>;

    /// Enumerate audio inputs and outputs
    async fn audio_devices(&self) -> AgentResult<AudioDevices>;

    /// Route capture to the given input device
    async fn set_audio_input_device(&self, device_id: &str) -> AgentResult<bool>;

    /// Route playback to the given output device
    async fn set_audio_output_device(&self, device_id: &str) -> AgentResult<bool>;

    /// Configure and activate the platform audio session
    async fn start_audio_session(&self) -> AgentResult<bool>;

    /// Deactivate the platform audio session
    async fn stop_audio_session(&self) -> AgentResult<bool>;

    /// Reclaim audio focus, needed on some devices after answering
    async fn unlock_audio_focus(&self) -> AgentResult<bool>;
}

/// Out-of-band notifications emitted by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// The meeting session started and audio is flowing
    MeetingStarted {
        #[serde(default)]
        meeting_id: Option<String>,
    },
    /// The meeting session ended
    MeetingEnded {
        #[serde(default)]
        meeting_id: Option<String>,
    },
    /// Local mute state changed
    AudioStatusChanged { muted: bool },
    /// The active audio route changed
    DeviceChanged {
        #[serde(default)]
        input_device: Option<String>,
        #[serde(default)]
        output_device: Option<String>,
    },
    /// The SDK reported an error
    Error {
        code: String,
        message: String,
    },
}
