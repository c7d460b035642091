//! Presence polling
//!
//! While the agent is online the [`PresencePoller`] asks the backend for the
//! agent's status on a fixed interval, with the first poll issued
//! immediately. A `Ringing` response carrying a call id becomes an
//! [`IncomingCall`]; any other difference is adopted as the server's view of
//! the agent.
//!
//! Each start of the poller opens a new polling generation in the
//! [`AgentStore`]. A poll result is applied only while its generation is
//! still current, so a response that arrives after polling was stopped (or
//! restarted) is dropped instead of clobbering newer state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::api::CallCenterApi;
use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, Notice};
use crate::store::AgentStore;
use crate::types::{AgentStatus, IncomingCall};

/// Caller shown when the backend omits it
const UNKNOWN_CALLER: &str = "Unknown";

/// What a single poll did to the agent state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Offline or unauthenticated; nothing was requested
    Skipped,
    /// Polling stopped while the request was in flight; the result was dropped
    Discarded,
    /// The server agrees with the local status
    Unchanged,
    /// The server offered an inbound call
    IncomingCall(IncomingCall),
    /// The server's status was adopted
    StatusAdopted(AgentStatus),
    /// The server reported a status the local model cannot adopt
    Ignored(AgentStatus),
    /// The request failed and the agent was moved to `Error`
    Failed(String),
}

struct PollerInner {
    store: AgentStore,
    api: Arc<dyn CallCenterApi>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Periodic presence poller for the signed-in agent
#[derive(Clone)]
pub struct PresencePoller {
    inner: Arc<PollerInner>,
}

impl std::fmt::Debug for PresencePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresencePoller")
            .field("interval", &self.inner.interval)
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl PresencePoller {
    pub fn new(store: AgentStore, api: Arc<dyn CallCenterApi>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                store,
                api,
                interval,
                task: Mutex::new(None),
            }),
        }
    }

    /// Start polling
    ///
    /// Idempotent: a running poller is left alone, and an offline agent is
    /// never polled. Fails only when called outside a Tokio runtime.
    pub fn start(&self) -> AgentResult<()> {
        let runtime = Handle::try_current()
            .map_err(|e| AgentError::internal(format!("Presence polling needs a Tokio runtime: {}", e)))?;

        let Some(generation) = self.inner.store.update(|state| state.begin_polling()) else {
            debug!("Presence polling already running or agent offline");
            return Ok(());
        };

        info!(generation, interval_ms = self.inner.interval.as_millis() as u64, "Starting presence polling");
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move { inner.run(generation).await });
        if let Some(previous) = self.inner.task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop polling; idempotent
    pub fn stop(&self) {
        let was_polling = self.inner.store.update(|state| state.end_polling());
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        if was_polling {
            info!("Stopped presence polling");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.store.with(|state| state.is_polling())
    }

    /// Stop polling until the returned guard is dropped
    pub fn suspend(&self) -> PollerSuspension {
        self.stop();
        PollerSuspension {
            poller: self.clone(),
            armed: true,
        }
    }

    /// Poll once outside the periodic loop and apply the result
    pub async fn poll_now(&self) -> PollOutcome {
        self.inner.poll_cycle(None).await
    }
}

impl PollerInner {
    async fn run(&self, generation: u64) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.store.with(|state| state.is_current_poll(generation)) {
                debug!(generation, "Polling generation ended");
                break;
            }
            self.poll_cycle(Some(generation)).await;
        }
    }

    /// Fetch the server status and reconcile it with local state
    async fn poll_cycle(&self, generation: Option<u64>) -> PollOutcome {
        let agent_id = self.store.with(|state| match state.status() {
            AgentStatus::Offline => None,
            _ => state.identity.as_ref().map(|identity| identity.agent_id.clone()),
        });
        let Some(agent_id) = agent_id else {
            return PollOutcome::Skipped;
        };

        let result = self.api.poll_agent_status(&agent_id).await;

        let outcome = self.store.update(|state| {
            if let Some(generation) = generation {
                if !state.is_current_poll(generation) {
                    return PollOutcome::Discarded;
                }
            }

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    if state.status() != AgentStatus::Offline {
                        state.set_status(AgentStatus::Error);
                    }
                    return PollOutcome::Failed(e.to_string());
                }
            };

            if response.status == AgentStatus::Ringing && state.status() != AgentStatus::Ringing {
                if let Some(call_id) = response.current_call_id {
                    let call = IncomingCall {
                        call_id,
                        from: response.from.unwrap_or_else(|| UNKNOWN_CALLER.to_string()),
                    };
                    state.incoming_call = Some(call.clone());
                    state.set_status(AgentStatus::Ringing);
                    return PollOutcome::IncomingCall(call);
                }
            }

            if response.status == state.status() {
                PollOutcome::Unchanged
            } else if state.adopt_remote_status(response.status) {
                PollOutcome::StatusAdopted(response.status)
            } else {
                PollOutcome::Ignored(response.status)
            }
        });

        match &outcome {
            PollOutcome::IncomingCall(call) => {
                info!(call_id = %call.call_id, from = %call.from, "Incoming call detected");
                self.store.events().publish(AgentEvent::IncomingCall(call.clone()));
                self.store
                    .events()
                    .notify(Notice::info("Incoming Call", format!("Call from {}", call.from)));
            }
            PollOutcome::StatusAdopted(status) => {
                info!(%status, "Adopted status reported by server");
            }
            PollOutcome::Ignored(status) => {
                debug!(%status, "Ignoring server status inconsistent with local call state");
            }
            PollOutcome::Failed(reason) => {
                error!(%agent_id, %reason, "Presence poll failed");
            }
            PollOutcome::Discarded => {
                debug!("Dropping poll result from a stale polling generation");
            }
            PollOutcome::Skipped | PollOutcome::Unchanged => {}
        }
        outcome
    }
}

/// Guard that keeps the presence poller stopped
///
/// Created by [`PresencePoller::suspend`]. Dropping the guard restarts
/// polling, which covers every exit path of the operation that held it.
/// [`PollerSuspension::disarm`] keeps polling stopped instead.
#[derive(Debug)]
pub struct PollerSuspension {
    poller: PresencePoller,
    armed: bool,
}

impl PollerSuspension {
    /// Leave polling stopped when the guard goes away
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PollerSuspension {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.poller.start() {
                warn!("Failed to resume presence polling: {}", e);
            }
        }
    }
}
