//! Shared fakes for agent-core scenario tests
//!
//! `FakeBridge` and `FakeApi` implement the collaborator traits with
//! scripted replies and record every call so tests can assert on the
//! sequence of side effects.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use callcenter_agent_core::auth::unsigned_token;
use callcenter_agent_core::types::{
    AgentStatusResponse, AttendeeInfo, CallAcceptedNotice, CallHungUpNotice, CallRejectedNotice,
    MediaPlacement, MeetingInfo, OutboundCallRequest, OutboundCallResponse, StartSessionResponse,
    TransferCallRequest,
};
use callcenter_agent_core::{
    AgentConfig, AgentError, AgentEvent, AgentManager, AgentResult, AudioDevice, AudioDevices,
    CallCenterApi, Notice, VoipBridge,
};

pub const AGENT_ID: &str = "agent-1";

/// Scripted result of a boolean bridge or API operation
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Declined,
    Fail(&'static str),
}

impl Reply {
    fn bridge(&self, operation: &'static str) -> AgentResult<bool> {
        match self {
            Reply::Ok => Ok(true),
            Reply::Declined => Ok(false),
            Reply::Fail(message) => Err(AgentError::bridge(operation, *message)),
        }
    }

    fn api(&self, operation: &'static str) -> AgentResult<bool> {
        match self {
            Reply::Ok => Ok(true),
            Reply::Declined => Ok(false),
            Reply::Fail(message) => Err(AgentError::api(operation, *message)),
        }
    }
}

// ===== BRIDGE =====

pub struct FakeBridge {
    calls: Mutex<Vec<&'static str>>,
    pub start_audio: Mutex<Reply>,
    pub join: Mutex<Reply>,
    pub join_delay: Mutex<Option<Duration>>,
    pub leave: Mutex<Reply>,
    pub mute: Mutex<Reply>,
    pub set_input: Mutex<Reply>,
    pub set_output: Mutex<Reply>,
    pub unlock: Mutex<Reply>,
    /// `None` makes device listing fail
    pub devices: Mutex<Option<AudioDevices>>,
}

impl Default for FakeBridge {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start_audio: Mutex::new(Reply::Ok),
            join: Mutex::new(Reply::Ok),
            join_delay: Mutex::new(None),
            leave: Mutex::new(Reply::Ok),
            mute: Mutex::new(Reply::Ok),
            set_input: Mutex::new(Reply::Ok),
            set_output: Mutex::new(Reply::Ok),
            unlock: Mutex::new(Reply::Ok),
            devices: Mutex::new(Some(default_devices())),
        }
    }
}

impl FakeBridge {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls.lock().iter().any(|c| *c == operation)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, operation: &'static str) {
        self.calls.lock().push(operation);
    }
}

#[async_trait]
impl VoipBridge for FakeBridge {
    async fn join_meeting(&self, _meeting: &MeetingInfo, _attendee: &AttendeeInfo) -> AgentResult<bool> {
        self.record("join_meeting");
        let delay = *self.join_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.join.lock().clone();
        reply.bridge("join_meeting")
    }

    async fn leave_meeting(&self) -> AgentResult<bool> {
        self.record("leave_meeting");
        let reply = self.leave.lock().clone();
        reply.bridge("leave_meeting")
    }

    async fn mute(&self) -> AgentResult<bool> {
        self.record("mute");
        let reply = self.mute.lock().clone();
        reply.bridge("mute")
    }

    async fn unmute(&self) -> AgentResult<bool> {
        self.record("unmute");
        let reply = self.mute.lock().clone();
        reply.bridge("unmute")
    }

    async fn audio_devices(&self) -> AgentResult<AudioDevices> {
        self.record("audio_devices");
        self.devices
            .lock()
            .clone()
            .ok_or_else(|| AgentError::bridge("audio_devices", "enumeration failed"))
    }

    async fn set_audio_input_device(&self, _device_id: &str) -> AgentResult<bool> {
        self.record("set_audio_input_device");
        let reply = self.set_input.lock().clone();
        reply.bridge("set_audio_input_device")
    }

    async fn set_audio_output_device(&self, _device_id: &str) -> AgentResult<bool> {
        self.record("set_audio_output_device");
        let reply = self.set_output.lock().clone();
        reply.bridge("set_audio_output_device")
    }

    async fn start_audio_session(&self) -> AgentResult<bool> {
        self.record("start_audio_session");
        let reply = self.start_audio.lock().clone();
        reply.bridge("start_audio_session")
    }

    async fn stop_audio_session(&self) -> AgentResult<bool> {
        self.record("stop_audio_session");
        Ok(true)
    }

    async fn unlock_audio_focus(&self) -> AgentResult<bool> {
        self.record("unlock_audio_focus");
        let reply = self.unlock.lock().clone();
        reply.bridge("unlock_audio_focus")
    }
}

// ===== REMOTE API =====

pub struct FakeApi {
    calls: Mutex<Vec<&'static str>>,
    pub start_session: Mutex<Result<StartSessionResponse, &'static str>>,
    pub stop_session: Mutex<Reply>,
    pub outbound: Mutex<Result<String, &'static str>>,
    pub accept: Mutex<Reply>,
    pub reject: Mutex<Reply>,
    pub hangup: Mutex<Reply>,
    pub hangup_delay: Mutex<Option<Duration>>,
    pub transfer: Mutex<Reply>,
    pub transfer_delay: Mutex<Option<Duration>>,

    /// Poll replies consumed in order; `poll_default` once empty
    pub polls: Mutex<VecDeque<Result<AgentStatusResponse, &'static str>>>,
    pub poll_default: Mutex<AgentStatusResponse>,
    pub poll_count: AtomicUsize,

    pub token: Mutex<Option<String>>,
    pub accepted: Mutex<Vec<CallAcceptedNotice>>,
    pub rejected: Mutex<Vec<CallRejectedNotice>>,
    pub hung_up: Mutex<Vec<CallHungUpNotice>>,
    pub transfers: Mutex<Vec<TransferCallRequest>>,
    pub dialed: Mutex<Vec<OutboundCallRequest>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start_session: Mutex::new(Ok(session_response())),
            stop_session: Mutex::new(Reply::Ok),
            outbound: Mutex::new(Ok("out-1".to_string())),
            accept: Mutex::new(Reply::Ok),
            reject: Mutex::new(Reply::Ok),
            hangup: Mutex::new(Reply::Ok),
            hangup_delay: Mutex::new(None),
            transfer: Mutex::new(Reply::Ok),
            transfer_delay: Mutex::new(None),
            polls: Mutex::new(VecDeque::new()),
            poll_default: Mutex::new(AgentStatusResponse::with_status(
                callcenter_agent_core::AgentStatus::Online,
            )),
            poll_count: AtomicUsize::new(0),
            token: Mutex::new(None),
            accepted: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
            hung_up: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            dialed: Mutex::new(Vec::new()),
        }
    }
}

impl FakeApi {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls.lock().iter().any(|c| *c == operation)
    }

    pub fn push_poll(&self, reply: Result<AgentStatusResponse, &'static str>) {
        self.polls.lock().push_back(reply);
    }

    pub fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &'static str) {
        self.calls.lock().push(operation);
    }
}

#[async_trait]
impl CallCenterApi for FakeApi {
    fn set_auth_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }

    async fn start_session(&self, _clinic_ids: &[String]) -> AgentResult<StartSessionResponse> {
        self.record("start_session");
        self.start_session
            .lock()
            .clone()
            .map_err(|message| AgentError::api("start_session", message))
    }

    async fn stop_session(&self) -> AgentResult<bool> {
        self.record("stop_session");
        let reply = self.stop_session.lock().clone();
        reply.api("stop_session")
    }

    async fn outbound_call(&self, request: &OutboundCallRequest) -> AgentResult<OutboundCallResponse> {
        self.record("outbound_call");
        self.dialed.lock().push(request.clone());
        let reply = self.outbound.lock().clone();
        reply
            .map(|call_id| OutboundCallResponse {
                call_id,
                message: None,
                success: Some(true),
            })
            .map_err(|message| AgentError::api("outbound_call", message))
    }

    async fn notify_call_accepted(&self, notice: &CallAcceptedNotice) -> AgentResult<bool> {
        self.record("notify_call_accepted");
        self.accepted.lock().push(notice.clone());
        let reply = self.accept.lock().clone();
        reply.api("notify_call_accepted")
    }

    async fn notify_call_rejected(&self, notice: &CallRejectedNotice) -> AgentResult<bool> {
        self.record("notify_call_rejected");
        self.rejected.lock().push(notice.clone());
        let reply = self.reject.lock().clone();
        reply.api("notify_call_rejected")
    }

    async fn notify_call_hung_up(&self, notice: &CallHungUpNotice) -> AgentResult<bool> {
        self.record("notify_call_hung_up");
        self.hung_up.lock().push(notice.clone());
        let delay = *self.hangup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.hangup.lock().clone();
        reply.api("notify_call_hung_up")
    }

    async fn transfer_call(&self, request: &TransferCallRequest) -> AgentResult<bool> {
        self.record("transfer_call");
        self.transfers.lock().push(request.clone());
        let delay = *self.transfer_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.transfer.lock().clone();
        reply.api("transfer_call")
    }

    async fn poll_agent_status(&self, _agent_id: &str) -> AgentResult<AgentStatusResponse> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().pop_front();
        match next {
            Some(reply) => reply.map_err(|message| AgentError::api("poll_agent_status", message)),
            None => Ok(self.poll_default.lock().clone()),
        }
    }
}

// ===== FIXTURES =====

pub fn default_devices() -> AudioDevices {
    AudioDevices {
        input_devices: vec![
            AudioDevice {
                device_id: "mic-1".to_string(),
                label: "Built-in Microphone".to_string(),
            },
            AudioDevice {
                device_id: "mic-2".to_string(),
                label: "Headset Microphone".to_string(),
            },
        ],
        output_devices: vec![AudioDevice {
            device_id: "speaker-1".to_string(),
            label: "Speaker".to_string(),
        }],
    }
}

pub fn session_response() -> StartSessionResponse {
    StartSessionResponse {
        meeting: Some(MeetingInfo {
            meeting_id: "meeting-1".to_string(),
            media_region: "us-east-1".to_string(),
            media_placement: MediaPlacement {
                audio_host_url: "audio.example.com:3478".to_string(),
                signaling_url: "wss://signal.example.com/control".to_string(),
                turn_control_url: "https://turn.example.com".to_string(),
            },
        }),
        attendee: Some(AttendeeInfo {
            attendee_id: "attendee-1".to_string(),
            join_token: "join-token".to_string(),
        }),
    }
}

/// Token for `agent-1`, authorized for `clinicA` and `clinicB`
pub fn agent_token() -> String {
    unsigned_token(&json!({
        "sub": AGENT_ID,
        "cognito:groups": ["clinic_clinicA__ADMIN", "other-group"],
        "x_rbc": "clinicB:P",
    }))
}

pub fn clinics(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn test_config() -> AgentConfig {
    AgentConfig::new()
        .with_api_base_url("http://127.0.0.1:9")
        .with_status_poll_interval(Duration::from_secs(5))
        .with_connection_timeout(Duration::from_secs(30))
}

// ===== HARNESS =====

pub struct Harness {
    pub manager: Arc<AgentManager>,
    pub bridge: Arc<FakeBridge>,
    pub api: Arc<FakeApi>,
    pub events: broadcast::Receiver<AgentEvent>,
}

impl Harness {
    /// Signed-in agent, still offline
    pub async fn signed_in() -> Self {
        let harness = Self::signed_out();
        harness
            .manager
            .set_auth_token(Some(agent_token()))
            .await
            .expect("token should parse");
        harness
    }

    /// No token yet
    pub fn signed_out() -> Self {
        let bridge = Arc::new(FakeBridge::default());
        let api = Arc::new(FakeApi::default());
        let manager = AgentManager::builder()
            .config(test_config())
            .bridge(bridge.clone())
            .api(api.clone())
            .build()
            .expect("manager should build");
        let events = manager.subscribe();
        Self {
            manager: Arc::new(manager),
            bridge,
            api,
            events,
        }
    }

    /// Signed-in agent online for `clinicA`, with the first poll done
    pub async fn online() -> Self {
        let mut harness = Self::signed_in().await;
        harness
            .manager
            .go_online(&clinics(&["clinicA"]))
            .await
            .expect("go online should succeed");
        settle().await;
        harness.drain();
        harness.bridge.clear_calls();
        harness
    }

    /// Online agent with an inbound call `c1` ringing
    pub async fn ringing() -> Self {
        let harness = Self::online().await;
        harness.api.push_poll(Ok(AgentStatusResponse::ringing(
            "c1",
            Some("+15551234567".to_string()),
        )));
        let _ = harness.manager.refresh_status().await;
        harness
    }

    /// Agent in a connected inbound call `c1`
    pub async fn in_call() -> Self {
        let mut harness = Self::ringing().await;
        harness.manager.accept_call().await.expect("accept should succeed");
        harness.drain();
        harness
    }

    /// Every event published since the last drain
    pub fn drain(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn notices(&mut self) -> Vec<Notice> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                AgentEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}

/// Let spawned tasks (poller, watchdog) run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
