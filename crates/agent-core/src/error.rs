//! Error types for agent presence and call lifecycle operations

use thiserror::Error;

use crate::types::AgentStatus;

/// Result type for agent-core operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while coordinating agent presence and calls
///
/// Precondition variants (`NotAuthenticated`, `InvalidState`, `UnauthorizedClinics`,
/// `NoIncomingCall`, `NoActiveCall`, `BridgeNotConnected`) are returned before any
/// side effect happens. Remote and bridge variants are returned only after the
/// coordinator has rolled back to a safe status.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No authenticated agent (missing or unparseable token)
    #[error("Agent is not authenticated")]
    NotAuthenticated,

    /// Operation invoked from a status that does not allow it
    #[error("Cannot {operation} while agent is {status}")]
    InvalidState {
        operation: &'static str,
        status: AgentStatus,
    },

    /// Requested clinics are not in the agent's authorized set
    #[error("You are not authorized for these clinics: {}", clinic_ids.join(", "))]
    UnauthorizedClinics { clinic_ids: Vec<String> },

    /// Going online without selecting any clinic
    #[error("At least one clinic must be selected")]
    NoClinicsSelected,

    /// Accept or reject without a pending incoming call
    #[error("No incoming call")]
    NoIncomingCall,

    /// Call control without an active call session
    #[error("No active call")]
    NoActiveCall,

    /// The VoIP bridge is not joined to a meeting
    #[error("VoIP bridge is not connected")]
    BridgeNotConnected,

    /// A required argument was missing or empty
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Remote call API rejected or failed a request
    #[error("Call API error during {operation}: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// HTTP transport failure
    #[cfg(feature = "http-client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// VoIP bridge operation failed
    #[error("VoIP bridge error during {operation}: {message}")]
    Bridge {
        operation: &'static str,
        message: String,
    },

    /// Start-session response lacked meeting or attendee credentials
    #[error("Invalid session data from server: {reason}")]
    InvalidSessionData { reason: String },

    /// Bridge reported an unsuccessful join
    #[error("Failed to join meeting")]
    JoinFailed,

    /// Go-online did not complete before the connection watchdog fired
    #[error("Connection timed out after {seconds} seconds")]
    ConnectionTimeout { seconds: u64 },

    /// Auth token could not be decoded
    #[error("Invalid auth token: {reason}")]
    InvalidToken { reason: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, status: AgentStatus) -> Self {
        Self::InvalidState { operation, status }
    }

    /// Create a remote API error
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }

    /// Create a bridge error
    pub fn bridge(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Bridge {
            operation,
            message: message.into(),
        }
    }

    /// Create an invalid token error
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error was a guard rejection with no side effects
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::InvalidState { .. }
                | Self::UnauthorizedClinics { .. }
                | Self::NoClinicsSelected
                | Self::NoIncomingCall
                | Self::NoActiveCall
                | Self::BridgeNotConnected
                | Self::InvalidArgument { .. }
        )
    }

    /// Message shown to the agent when going online fails
    ///
    /// Failures are categorized by the text of the underlying reason:
    /// microphone permission problems, audio device problems, and everything
    /// else as a generic connection error.
    pub fn user_message(&self) -> String {
        let reason = self.to_string();
        let lower = reason.to_lowercase();
        if lower.contains("permission") {
            "Microphone permission denied. Please allow microphone access.".to_string()
        } else if lower.contains("device") {
            "Audio device error. Please check your microphone and speakers.".to_string()
        } else {
            format!("Connection error: {}", reason)
        }
    }
}
