//! Mute and audio device routing
//!
//! Thin pass-throughs to the bridge. Local state mirrors the bridge only
//! after it reports success; `Ok(false)` from the bridge counts as a failure.

use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, Notice};
use crate::types::AudioDevices;

impl super::AgentManager {
    /// Flip the microphone mute state, returning the new state
    pub async fn toggle_mute(&self) -> AgentResult<bool> {
        let muted = self.is_muted();
        let (operation, result) = if muted {
            ("unmute", self.bridge.unmute().await)
        } else {
            ("mute", self.bridge.mute().await)
        };

        match declined_as_error(operation, result) {
            Ok(()) => {
                let now_muted = !muted;
                self.store.update(|state| state.muted = now_muted);
                self.store
                    .events()
                    .publish(AgentEvent::MuteChanged { muted: now_muted });
                tracing::debug!(muted = now_muted, "Toggled mute");
                Ok(now_muted)
            }
            Err(e) => {
                tracing::error!("Failed to toggle mute: {}", e);
                self.store
                    .events()
                    .notify(Notice::error("Error", "Failed to toggle mute. Please try again."));
                Err(e)
            }
        }
    }

    /// Route capture to `device_id`
    pub async fn select_audio_input(&self, device_id: &str) -> AgentResult<()> {
        let result = self.bridge.set_audio_input_device(device_id).await;
        match declined_as_error("set_audio_input_device", result) {
            Ok(()) => {
                self.store
                    .update(|state| state.selected_input = Some(device_id.to_string()));
                tracing::info!(device_id, "Selected audio input");
                Ok(())
            }
            Err(e) => {
                tracing::error!(device_id, "Failed to set audio input: {}", e);
                self.store
                    .events()
                    .notify(Notice::error("Error", "Failed to set audio input device."));
                Err(e)
            }
        }
    }

    /// Route playback to `device_id`
    pub async fn select_audio_output(&self, device_id: &str) -> AgentResult<()> {
        let result = self.bridge.set_audio_output_device(device_id).await;
        match declined_as_error("set_audio_output_device", result) {
            Ok(()) => {
                self.store
                    .update(|state| state.selected_output = Some(device_id.to_string()));
                tracing::info!(device_id, "Selected audio output");
                Ok(())
            }
            Err(e) => {
                tracing::error!(device_id, "Failed to set audio output: {}", e);
                self.store
                    .events()
                    .notify(Notice::error("Error", "Failed to set audio output device."));
                Err(e)
            }
        }
    }

    /// Reclaim audio focus from the platform
    pub async fn unlock_audio(&self) -> AgentResult<bool> {
        match self.bridge.unlock_audio_focus().await {
            Ok(unlocked) => {
                if !unlocked {
                    tracing::warn!("Bridge did not unlock audio focus");
                }
                Ok(unlocked)
            }
            Err(e) => {
                tracing::error!("Failed to unlock audio: {}", e);
                self.store
                    .events()
                    .notify(Notice::error("Error", "Failed to unlock audio."));
                Err(e)
            }
        }
    }

    /// Re-enumerate audio devices and publish the result
    ///
    /// A bridge failure yields empty lists rather than an error.
    pub async fn refresh_audio_devices(&self) -> AudioDevices {
        let devices = match self.bridge.audio_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Failed to list audio devices: {}", e);
                AudioDevices::default()
            }
        };
        tracing::debug!(
            inputs = devices.input_devices.len(),
            outputs = devices.output_devices.len(),
            "Audio devices listed"
        );
        self.store.update(|state| state.audio_devices = devices.clone());
        self.store
            .events()
            .publish(AgentEvent::DevicesChanged(devices.clone()));
        devices
    }

    /// List devices after joining and select the first input and output
    pub(crate) async fn load_audio_devices(&self) {
        let devices = self.refresh_audio_devices().await;
        if let Some(input) = devices.input_devices.first() {
            // Failures already surfaced as notices.
            let _ = self.select_audio_input(&input.device_id).await;
        }
        if let Some(output) = devices.output_devices.first() {
            let _ = self.select_audio_output(&output.device_id).await;
        }
    }
}

fn declined_as_error(operation: &'static str, result: AgentResult<bool>) -> AgentResult<()> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(AgentError::bridge(operation, "request was declined")),
        Err(e) => Err(e),
    }
}
