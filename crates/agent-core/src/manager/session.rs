//! Going online and offline
//!
//! Going online is a chain of remote steps guarded by a connection watchdog:
//!
//! 1. start the local audio session
//! 2. request a personal session for the selected clinics
//! 3. join the bridge with the returned meeting and attendee
//! 4. commit `Online`, start presence polling, pick default audio devices
//!
//! The watchdog is a [`TimerHandle`] stored next to the `Connecting` status it
//! guards. Each attempt is numbered, and every step re-checks that its attempt
//! is still the one in `Connecting`; a join that completes after the watchdog
//! fired is cleaned up and discarded.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, Notice};
use crate::store::{AgentStore, TimerHandle};
use crate::types::{AgentStatus, PersonalSession};

impl super::AgentManager {
    /// Go online for the given clinics
    ///
    /// The agent must be authenticated, `Offline`, and authorized for every
    /// requested clinic. On failure the agent is back to `Offline` before the
    /// error is returned.
    pub async fn go_online(&self, clinic_ids: &[String]) -> AgentResult<()> {
        let identity = self.require_identity("go online")?;

        if clinic_ids.is_empty() {
            warn!("Rejected go online: no clinics selected");
            return Err(AgentError::NoClinicsSelected);
        }

        let unauthorized: Vec<String> = identity
            .unauthorized(clinic_ids)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !unauthorized.is_empty() {
            let err = AgentError::UnauthorizedClinics {
                clinic_ids: unauthorized,
            };
            warn!(agent_id = %identity.agent_id, "Rejected go online: {}", err);
            self.store.events().notify(Notice::error("Unauthorized", err.to_string()));
            return Err(err);
        }

        let attempt = self.store.update(|state| {
            if state.status() != AgentStatus::Offline {
                return Err(AgentError::invalid_state("go online", state.status()));
            }
            let attempt = state.next_connect_attempt();
            state.set_status(AgentStatus::Connecting);
            state.connection_timeout = Some(self.spawn_connection_watchdog(attempt));
            Ok(attempt)
        });
        let attempt = attempt.map_err(|e| {
            warn!("{}", e);
            e
        })?;

        info!(agent_id = %identity.agent_id, clinics = ?clinic_ids, attempt, "Going ONLINE");

        match self.connect(attempt, clinic_ids).await {
            Ok(()) => {
                self.store.events().notify(Notice::success(
                    "Success",
                    "You are now online and ready to receive calls",
                ));
                Ok(())
            }
            Err(err) => {
                self.abort_go_online(attempt, &err).await;
                Err(err)
            }
        }
    }

    async fn connect(&self, attempt: u64, clinic_ids: &[String]) -> AgentResult<()> {
        if !self.bridge.start_audio_session().await? {
            return Err(AgentError::bridge("start_audio_session", "audio session was not started"));
        }
        self.ensure_attempt(attempt)?;

        let response = self.api.start_session(clinic_ids).await?;
        self.ensure_attempt(attempt)?;

        let session = PersonalSession::try_from(response)?;
        debug!(meeting_id = %session.meeting.meeting_id, "Received personal session");
        self.store.update(|state| state.personal_session = Some(session.clone()));

        if !self.bridge.join_meeting(&session.meeting, &session.attendee).await? {
            return Err(AgentError::JoinFailed);
        }

        let committed = self.store.update(|state| {
            if !state.is_connecting(attempt) {
                return false;
            }
            state.bridge_connected = true;
            state.set_status(AgentStatus::Online);
            true
        });
        if !committed {
            return Err(self.timeout_error());
        }

        self.poller.start()?;
        self.load_audio_devices().await;
        info!(attempt, "Agent is ONLINE");
        Ok(())
    }

    /// Err if the watchdog or another operation took this attempt out of `Connecting`
    fn ensure_attempt(&self, attempt: u64) -> AgentResult<()> {
        if self.store.with(|state| state.is_connecting(attempt)) {
            Ok(())
        } else {
            Err(self.timeout_error())
        }
    }

    fn timeout_error(&self) -> AgentError {
        AgentError::ConnectionTimeout {
            seconds: self.config.connection_timeout.as_secs(),
        }
    }

    fn spawn_connection_watchdog(&self, attempt: u64) -> TimerHandle {
        let store = self.store.clone();
        let timeout = self.config.connection_timeout;
        TimerHandle::after(timeout, move || expire_connection(&store, attempt))
    }

    /// Roll a failed go-online attempt back to `Offline`
    async fn abort_go_online(&self, attempt: u64, err: &AgentError) {
        error!(attempt, "Failed to go online: {}", err);

        // A newer attempt owns the bridge now; leave it alone.
        let superseded = self.store.with(|state| state.connect_attempt != attempt);
        if superseded {
            debug!(attempt, "Go online attempt superseded, skipping cleanup");
            return;
        }

        self.poller.stop();
        match self.bridge.leave_meeting().await {
            Ok(_) => {}
            Err(e) => debug!("Cleanup leave meeting failed: {}", e),
        }
        match self.bridge.stop_audio_session().await {
            Ok(_) => {}
            Err(e) => debug!("Cleanup stop audio session failed: {}", e),
        }

        self.store.update(|state| {
            if state.connect_attempt != attempt {
                return;
            }
            state.personal_session = None;
            state.bridge_connected = false;
            state.set_status(AgentStatus::Offline);
        });

        // The watchdog already told the agent about the timeout.
        if !matches!(err, AgentError::ConnectionTimeout { .. }) {
            self.store
                .events()
                .notify(Notice::error("Connection Failed", err.user_message()));
        }
    }

    /// Go offline
    ///
    /// A no-op when already `Offline`. Refused while `Connecting`, which has
    /// to resolve to `Online` or time out first.
    pub async fn go_offline(&self) -> AgentResult<()> {
        match self.status() {
            AgentStatus::Offline => {
                debug!("Already offline");
                Ok(())
            }
            AgentStatus::Connecting => {
                let err = AgentError::invalid_state("go offline", AgentStatus::Connecting);
                warn!("{}", err);
                Err(err)
            }
            _ => {
                self.force_offline().await;
                Ok(())
            }
        }
    }

    /// Tear everything down and end `Offline`, whatever fails on the way
    pub(crate) async fn force_offline(&self) {
        info!("Going OFFLINE");
        self.poller.stop();
        self.store.update(|state| state.set_status(AgentStatus::Connecting));

        if let Err(e) = self.bridge.leave_meeting().await {
            error!("Failed to leave meeting: {}", e);
        }
        if let Err(e) = self.bridge.stop_audio_session().await {
            error!("Failed to stop audio session: {}", e);
        }

        match self.api.stop_session().await {
            Ok(true) => debug!("Backend session stopped"),
            Ok(false) => {
                warn!("Backend declined to stop the session");
                self.store
                    .events()
                    .notify(Notice::warning("Warning", "Server error stopping session."));
            }
            Err(e) => {
                warn!("Failed to stop backend session: {}", e);
                self.store
                    .events()
                    .notify(Notice::warning("Warning", "Server error stopping session."));
            }
        }

        let ended_call = self.store.update(|state| {
            let ended = state.active_call.take();
            state.clear_session();
            state.set_status(AgentStatus::Offline);
            ended
        });
        if let Some(call) = ended_call {
            self.store.events().publish(AgentEvent::CallEnded {
                duration_secs: call.duration_secs(Utc::now()),
                call_id: call.call_id,
            });
        }
        info!("Agent is OFFLINE");
    }
}

/// Connection watchdog body: revert to `Offline` if the attempt is still pending
fn expire_connection(store: &AgentStore, attempt: u64) {
    let expired = store.update(|state| {
        if !state.is_connecting(attempt) {
            return false;
        }
        state.personal_session = None;
        state.bridge_connected = false;
        state.set_status(AgentStatus::Offline);
        true
    });

    if expired {
        warn!(attempt, "Connection timeout reached, forcing OFFLINE");
        store
            .events()
            .notify(Notice::error("Connection Timeout", "Failed to connect. Please try again."));
    } else {
        debug!(attempt, "Connection watchdog fired after attempt resolved");
    }
}
