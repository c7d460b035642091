//! Call operations for the agent manager
//!
//! Answering, declining, ending, dialing and transferring the single call the
//! agent can have. Every operation checks its guard under the store lock and
//! returns a precondition error without side effects when it does not hold.
//!
//! Remote notifications fall in two groups:
//!
//! - **Committing** (`accept`, `outbound`, `transfer`): a failure triggers a
//!   compensating transition and is returned to the caller
//! - **Best effort** (`reject`, `hangup`): a failure is logged and local
//!   cleanup proceeds
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use callcenter_agent_core::{AgentEvent, AgentManager};
//!
//! async fn answer_everything(manager: &AgentManager) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut events = manager.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let AgentEvent::IncomingCall(call) = event {
//!             println!("Answering call from {}", call.from);
//!             manager.accept_call().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use chrono::Utc;

use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, Notice};
use crate::types::{
    AgentStatus, CallAcceptedNotice, CallDirection, CallHungUpNotice, CallRejectedNotice,
    CallSession, CallStatus, OutboundCallRequest, TransferCallRequest,
};

/// Reason sent to the backend when the agent declines a call
const REJECT_REASON: &str = "Agent rejected";

/// Reason sent to the backend when the agent ends a call
const HANGUP_REASON: &str = "Agent hung up";

/// Call operations implementation for AgentManager
impl super::AgentManager {
    /// Answer the ringing inbound call
    ///
    /// The status moves to `InCall` with a connected [`CallSession`] before
    /// the backend confirms. If the backend refuses, the tentative call is
    /// dropped, the agent returns to `Online` and polling resumes.
    pub async fn accept_call(&self) -> AgentResult<()> {
        let identity = self.require_identity("accept call")?;

        let tentative = self.store.update(|state| {
            let incoming = state.incoming_call.clone().ok_or(AgentError::NoIncomingCall)?;
            if state.status() != AgentStatus::Ringing {
                return Err(AgentError::invalid_state("accept call", state.status()));
            }
            let call = CallSession {
                call_id: incoming.call_id,
                direction: CallDirection::Inbound,
                from: incoming.from,
                to: identity.agent_id.clone(),
                status: CallStatus::Connected,
                start_time: Utc::now(),
            };
            state.active_call = Some(call.clone());
            state.set_status(AgentStatus::InCall);
            Ok(call)
        });
        let call = tentative.map_err(|e| {
            tracing::warn!("Rejected accept call: {}", e);
            e
        })?;

        tracing::info!(call_id = %call.call_id, "Accepting call");
        let notice = CallAcceptedNotice {
            call_id: call.call_id.clone(),
            agent_id: identity.agent_id.clone(),
        };
        let confirmed = match self.api.notify_call_accepted(&notice).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AgentError::api("notify_call_accepted", "backend declined the call acceptance")),
            Err(e) => Err(e),
        };

        if let Err(e) = confirmed {
            tracing::error!(call_id = %call.call_id, "Failed to accept call: {}", e);
            self.store.update(|state| {
                if state.active_call.as_ref().map(|c| c.call_id == call.call_id) == Some(true) {
                    state.active_call = None;
                }
                state.incoming_call = None;
                if state.status() == AgentStatus::InCall {
                    state.set_status(AgentStatus::Online);
                }
            });
            self.resume_polling();
            self.store
                .events()
                .notify(Notice::error("Call Error", format!("Failed to accept call: {}", e)));
            return Err(e);
        }

        self.store.update(|state| {
            if state.incoming_call.as_ref().map(|c| c.call_id == call.call_id) == Some(true) {
                state.incoming_call = None;
            }
        });
        self.store.events().publish(AgentEvent::CallStarted(call.clone()));
        tracing::info!(call_id = %call.call_id, "Accepted call");

        match self.bridge.unlock_audio_focus().await {
            Ok(true) => tracing::debug!("Audio focus unlocked after accept"),
            Ok(false) => self.warn_audio_unlock("bridge declined"),
            Err(e) => self.warn_audio_unlock(&e.to_string()),
        }
        Ok(())
    }

    fn warn_audio_unlock(&self, reason: &str) {
        tracing::warn!("Audio unlock after accept failed: {}", reason);
        self.store.events().notify(Notice::warning(
            "Audio Notice",
            "Call connected. Click the audio button if you hear no sound.",
        ));
    }

    /// Decline the ringing inbound call
    ///
    /// If the bridge lost its meeting meanwhile, declining is treated as a
    /// lost connection and the agent goes fully offline.
    pub async fn reject_call(&self) -> AgentResult<()> {
        let identity = self.require_identity("reject call")?;

        let incoming = self.store.with(|state| {
            let incoming = state.incoming_call.clone().ok_or(AgentError::NoIncomingCall)?;
            if state.status() != AgentStatus::Ringing {
                return Err(AgentError::invalid_state("reject call", state.status()));
            }
            Ok(incoming)
        });
        let incoming = incoming.map_err(|e| {
            tracing::warn!("Rejected reject call: {}", e);
            e
        })?;

        let notice = CallRejectedNotice {
            call_id: incoming.call_id.clone(),
            agent_id: identity.agent_id.clone(),
            reason: Some(REJECT_REASON.to_string()),
        };
        match self.api.notify_call_rejected(&notice).await {
            Ok(true) => tracing::debug!(call_id = %incoming.call_id, "Backend acknowledged rejection"),
            Ok(false) => tracing::warn!(call_id = %incoming.call_id, "Backend declined the rejection notice"),
            Err(e) => tracing::warn!(call_id = %incoming.call_id, "Failed to notify rejection: {}", e),
        }

        let connected = self.store.update(|state| {
            if state.incoming_call.as_ref().map(|c| c.call_id == incoming.call_id) == Some(true) {
                state.incoming_call = None;
            }
            if !state.bridge_connected {
                return false;
            }
            if state.status() == AgentStatus::Ringing {
                state.set_status(AgentStatus::Online);
            }
            true
        });

        if connected {
            self.resume_polling();
            tracing::info!(call_id = %incoming.call_id, "Rejected call");
        } else {
            tracing::warn!(call_id = %incoming.call_id, "Bridge disconnected during rejection, going offline");
            self.force_offline().await;
        }
        Ok(())
    }

    /// End the active call and return to `Online`
    ///
    /// Refused while another hangup is in progress. If the call cannot be
    /// cleared cleanly the agent is forced offline instead, so the agent never
    /// stays in a call-less non-`Online` status.
    pub async fn hang_up(&self) -> AgentResult<()> {
        let identity = self.require_identity("hang up")?;
        let call = self.store.update(|state| {
            let call = state.active_call.clone().ok_or(AgentError::NoActiveCall)?;
            if matches!(state.status(), AgentStatus::Connecting | AgentStatus::Offline) {
                return Err(AgentError::invalid_state("hang up", state.status()));
            }
            state.end_polling();
            state.set_status(AgentStatus::Connecting);
            Ok(call)
        });
        let call = call.map_err(|e| {
            tracing::warn!("Rejected hang up: {}", e);
            e
        })?;

        tracing::info!(call_id = %call.call_id, "Hanging up call");
        let suspension = self.poller.suspend();

        match self.finish_hang_up(&call, &identity.agent_id).await {
            Ok(duration_secs) => {
                self.store.events().publish(AgentEvent::CallEnded {
                    call_id: call.call_id.clone(),
                    duration_secs,
                });
                tracing::info!(call_id = %call.call_id, duration_secs, "Hung up call");
                drop(suspension);
                Ok(())
            }
            Err(e) => {
                tracing::error!(call_id = %call.call_id, "Hang up failed, forcing offline: {}", e);
                suspension.disarm();
                self.force_offline().await;
                Err(e)
            }
        }
    }

    async fn finish_hang_up(&self, call: &CallSession, agent_id: &str) -> AgentResult<u64> {
        let duration = call.duration_secs(Utc::now());
        let notice = CallHungUpNotice {
            call_id: call.call_id.clone(),
            agent_id: agent_id.to_string(),
            duration,
            reason: Some(HANGUP_REASON.to_string()),
        };
        match self.api.notify_call_hung_up(&notice).await {
            Ok(true) => tracing::debug!(call_id = %call.call_id, "Backend acknowledged hangup"),
            Ok(false) => tracing::warn!(call_id = %call.call_id, "Backend declined the hangup notice"),
            Err(e) => tracing::warn!(call_id = %call.call_id, "Failed to notify hangup: {}", e),
        }

        self.store.update(|state| {
            match &state.active_call {
                Some(active) if active.call_id == call.call_id => {}
                _ => return Err(AgentError::internal("active call changed while hanging up")),
            }
            if state.status() != AgentStatus::Connecting {
                return Err(AgentError::invalid_state("finish hang up", state.status()));
            }
            state.active_call = None;
            state.set_status(AgentStatus::Online);
            Ok(())
        })?;
        Ok(duration)
    }

    /// Dial `phone_number` on behalf of `clinic_id`
    ///
    /// The agent shows `Ringing` while the callee has not answered. Polling
    /// is suspended for the dial request itself and resumed afterwards so the
    /// answer is picked up as `InCall`.
    pub async fn make_outbound_call(&self, phone_number: &str, clinic_id: &str) -> AgentResult<()> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() || clinic_id.trim().is_empty() {
            let err = AgentError::InvalidArgument {
                message: "phone number and clinic are required".to_string(),
            };
            tracing::warn!("Rejected outbound call: {}", err);
            return Err(err);
        }

        let dialing = self.store.update(|state| {
            if state.status() != AgentStatus::Online {
                return Err(AgentError::invalid_state("make outbound call", state.status()));
            }
            if !state.bridge_connected {
                return Err(AgentError::BridgeNotConnected);
            }
            state.set_status(AgentStatus::Ringing);
            Ok(())
        });
        if let Err(e) = dialing {
            tracing::warn!("Rejected outbound call: {}", e);
            self.store.events().notify(Notice::error(
                "Call Error",
                "Cannot make outbound call. Ensure you are \"Online\" and connected.",
            ));
            return Err(e);
        }
        let suspension = self.poller.suspend();

        tracing::info!(to = %phone_number, clinic_id, "Dialing outbound call");
        let request = OutboundCallRequest {
            to_phone_number: phone_number.to_string(),
            from_clinic_id: clinic_id.to_string(),
        };

        match self.api.outbound_call(&request).await {
            Ok(response) => {
                let call = CallSession {
                    call_id: response.call_id,
                    direction: CallDirection::Outbound,
                    from: clinic_id.to_string(),
                    to: phone_number.to_string(),
                    status: CallStatus::Ringing,
                    start_time: Utc::now(),
                };
                let status = self.store.update(|state| {
                    if state.status() == AgentStatus::Ringing {
                        state.active_call = Some(call.clone());
                    }
                    state.status()
                });
                if status != AgentStatus::Ringing {
                    suspension.disarm();
                    let err = AgentError::invalid_state("track outbound call", status);
                    tracing::warn!(call_id = %call.call_id, "Dropping outbound call: {}", err);
                    return Err(err);
                }

                tracing::info!(call_id = %call.call_id, "Outbound call initiated");
                self.store.events().publish(AgentEvent::CallStarted(call));
                drop(suspension);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to initiate outbound call: {}", e);
                self.store.update(|state| {
                    state.active_call = None;
                    if state.status() == AgentStatus::Ringing {
                        state.set_status(AgentStatus::Online);
                    }
                });
                self.store.events().notify(Notice::error(
                    "Call Error",
                    format!("Failed to initiate outbound call: {}", e),
                ));
                drop(suspension);
                Err(e)
            }
        }
    }

    /// Treat the dialing outbound call as answered
    ///
    /// Returns `false` with no side effects unless the agent is `Ringing`
    /// with an outbound call.
    pub fn force_outbound_connected(&self) -> bool {
        let connected = self.store.update(|state| {
            if state.status() != AgentStatus::Ringing {
                return None;
            }
            let call = state.active_call.as_mut()?;
            if call.direction != CallDirection::Outbound {
                return None;
            }
            call.status = CallStatus::Connected;
            call.start_time = Utc::now();
            let call = call.clone();
            state.set_status(AgentStatus::InCall);
            Some(call)
        });

        match connected {
            Some(call) => {
                self.poller.stop();
                tracing::info!(call_id = %call.call_id, "Outbound call marked connected");
                self.store.events().publish(AgentEvent::CallConnected(call));
                true
            }
            None => false,
        }
    }

    /// Hand the active call to another agent, then hang up locally
    ///
    /// The local hangup happens whether or not the backend accepted the
    /// transfer, as long as the agent is still `InCall`.
    pub async fn transfer_call(&self, to_agent_id: &str) -> AgentResult<()> {
        let identity = self.require_identity("transfer call")?;

        let call = self.store.with(|state| {
            let call = state.active_call.clone().ok_or(AgentError::NoActiveCall)?;
            if state.status() != AgentStatus::InCall {
                return Err(AgentError::invalid_state("transfer call", state.status()));
            }
            Ok(call)
        });
        let call = call.map_err(|e| {
            tracing::warn!("Rejected transfer: {}", e);
            e
        })?;

        tracing::info!(call_id = %call.call_id, to_agent_id, "Transferring call");
        let request = TransferCallRequest {
            call_id: call.call_id.clone(),
            from_agent_id: identity.agent_id.clone(),
            to_agent_id: to_agent_id.to_string(),
        };
        let transferred = match self.api.transfer_call(&request).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AgentError::api("transfer_call", "backend declined the transfer")),
            Err(e) => Err(e),
        };

        match transferred {
            Ok(()) => {
                if self.status() == AgentStatus::InCall {
                    self.hang_up().await?;
                } else {
                    tracing::warn!(
                        call_id = %call.call_id,
                        status = %self.status(),
                        "Agent left the call during transfer, skipping hang up"
                    );
                }
                self.store
                    .events()
                    .notify(Notice::info("Transfer", "Call transfer initiated."));
                Ok(())
            }
            Err(e) => {
                tracing::error!(call_id = %call.call_id, "Transfer failed: {}", e);
                self.store.events().notify(Notice::error(
                    "Transfer Error",
                    format!("Failed to initiate transfer: {}", e),
                ));
                if self.status() == AgentStatus::InCall {
                    if let Err(hangup_err) = self.hang_up().await {
                        tracing::error!("Hang up after failed transfer failed: {}", hangup_err);
                    }
                }
                Err(e)
            }
        }
    }

    /// Restart polling after a call flow, logging instead of failing
    pub(crate) fn resume_polling(&self) {
        if let Err(e) = self.poller.start() {
            tracing::warn!("Failed to resume presence polling: {}", e);
        }
    }
}
