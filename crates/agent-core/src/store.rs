//! Owned agent state shared by the coordinator and the presence poller
//!
//! [`AgentStore`] is the single place agent status, the pending incoming call,
//! the active call session and the personal session live. It is injected into
//! the coordinator and the poller instead of living in a global.
//!
//! Every mutation goes through [`AgentStore::update`], which runs the closure
//! under one lock acquisition and then applies the transition rules that must
//! hold atomically with any status change:
//!
//! - leaving `Connecting` cancels the connection watchdog stored next to it
//! - entering `Ringing`, `InCall` or `Offline` ends the current polling generation
//! - a `StatusChanged` event is published after the lock is released
//!
//! The lock is a `parking_lot::Mutex` and is never held across an `.await`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::AgentIdentity;
use crate::events::{AgentEvent, EventBus};
use crate::types::{
    AgentStatus, AudioDevices, CallDirection, CallSession, CallStatus, IncomingCall,
    PersonalSession,
};

/// A cancellable one-shot timer
///
/// Dropping the handle cancels the timer, so a handle stored inside the state
/// it guards is cancelled by whichever transition removes it.
#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `f` once after `delay` unless cancelled first
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        })
    }

    /// Track an arbitrary background task
    pub fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Cancel the timer; a no-op if it already fired
    pub fn cancel(self) {
        drop(self);
    }

}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Snapshot of everything the coordinator and poller track for the agent
#[derive(Debug, Default)]
pub struct AgentState {
    pub(crate) status: AgentStatus,
    pub(crate) identity: Option<AgentIdentity>,
    pub(crate) incoming_call: Option<IncomingCall>,
    pub(crate) active_call: Option<CallSession>,
    pub(crate) personal_session: Option<PersonalSession>,
    pub(crate) bridge_connected: bool,
    pub(crate) muted: bool,
    pub(crate) audio_devices: AudioDevices,
    pub(crate) selected_input: Option<String>,
    pub(crate) selected_output: Option<String>,

    /// Generation of the running poll loop, `None` when idle
    poll_generation: Option<u64>,
    last_poll_generation: u64,

    /// Go-online attempt counter and its watchdog
    pub(crate) connect_attempt: u64,
    pub(crate) connection_timeout: Option<TimerHandle>,
}

impl AgentState {
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    pub fn is_polling(&self) -> bool {
        self.poll_generation.is_some()
    }

    /// Start a new polling generation; `None` if already polling or offline
    pub(crate) fn begin_polling(&mut self) -> Option<u64> {
        if self.poll_generation.is_some() || self.status == AgentStatus::Offline {
            return None;
        }
        self.last_poll_generation += 1;
        self.poll_generation = Some(self.last_poll_generation);
        self.poll_generation
    }

    /// End the current polling generation; returns whether one was running
    pub(crate) fn end_polling(&mut self) -> bool {
        self.poll_generation.take().is_some()
    }

    pub(crate) fn is_current_poll(&self, generation: u64) -> bool {
        self.poll_generation == Some(generation)
    }

    /// Begin a new go-online attempt
    pub(crate) fn next_connect_attempt(&mut self) -> u64 {
        self.connect_attempt += 1;
        self.connect_attempt
    }

    pub(crate) fn is_connecting(&self, attempt: u64) -> bool {
        self.status == AgentStatus::Connecting && self.connect_attempt == attempt
    }

    /// Adopt a status reported by the backend
    ///
    /// While a call session exists only `InCall` and `Offline` are adopted;
    /// `InCall` promotes a dialing outbound call to connected. Statuses that
    /// would leave the local model inconsistent (`Connecting`, `Ringing`
    /// without a call, `InCall` without a call session) are ignored and
    /// `false` is returned.
    pub(crate) fn adopt_remote_status(&mut self, status: AgentStatus) -> bool {
        if self.active_call.is_some() && !matches!(status, AgentStatus::InCall | AgentStatus::Offline) {
            return false;
        }

        match status {
            AgentStatus::Connecting | AgentStatus::Ringing => false,
            AgentStatus::InCall => match self.active_call.as_mut() {
                Some(call) => {
                    if call.direction == CallDirection::Outbound && call.status == CallStatus::Ringing {
                        call.status = CallStatus::Connected;
                        call.start_time = chrono::Utc::now();
                    }
                    self.status = AgentStatus::InCall;
                    true
                }
                None => false,
            },
            AgentStatus::Offline => {
                self.status = AgentStatus::Offline;
                self.active_call = None;
                self.incoming_call = None;
                true
            }
            other => {
                self.status = other;
                true
            }
        }
    }

    /// Drop everything tied to being online
    pub(crate) fn clear_session(&mut self) {
        self.personal_session = None;
        self.active_call = None;
        self.incoming_call = None;
        self.bridge_connected = false;
    }
}

/// Cloneable handle to the shared agent state and its event bus
#[derive(Debug, Clone)]
pub struct AgentStore {
    state: Arc<Mutex<AgentState>>,
    events: EventBus,
}

impl AgentStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(AgentState::default())),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Read from the state under the lock
    pub fn with<R>(&self, f: impl FnOnce(&AgentState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn status(&self) -> AgentStatus {
        self.with(|s| s.status)
    }

    /// Mutate the state as one atomic transition
    pub fn update<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        let (result, previous, current, cancelled) = {
            let mut state = self.state.lock();
            let previous = state.status;
            let result = f(&mut state);
            let current = state.status;

            let mut cancelled = None;
            if previous != current {
                if previous == AgentStatus::Connecting {
                    cancelled = state.connection_timeout.take();
                }
                if matches!(
                    current,
                    AgentStatus::Ringing | AgentStatus::InCall | AgentStatus::Offline
                ) && state.end_polling()
                {
                    debug!(status = %current, "Polling generation ended by status change");
                }
            }
            (result, previous, current, cancelled)
        };

        if let Some(timer) = cancelled {
            timer.cancel();
        }
        if previous != current {
            info!(from = %previous, to = %current, "Agent status changed");
            self.events.publish(AgentEvent::StatusChanged { previous, current });
        }
        result
    }
}
