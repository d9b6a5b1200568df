//! Error types and handling for the softphone core
//!
//! Errors are grouped the same way the core reacts to them:
//!
//! - **Network errors** - engine unreachable or a request deadline elapsed.
//!   They force a state transition and are always surfaced as events.
//! - **Protocol errors** - the engine or the server rejected a request with a
//!   signaling-level failure. Same propagation as network errors.
//! - **State errors** - the command does not apply to the current state
//!   (stale session handle, no active call, not registered). Returned to the
//!   caller only, never emitted.
//! - **Resource errors** - the audio device is unavailable or busy. Returned
//!   synchronously from the audio API, never emitted.
//!
//! # Example
//!
//! ```rust
//! use softphone_core::ClientError;
//!
//! let err = ClientError::protocol_error(403, "Forbidden");
//! assert_eq!(err.category(), "protocol");
//! assert_eq!(err.status_code(), 403);
//! assert!(err.is_surfaced());
//!
//! let err = ClientError::invalid_state("hang_up", "Idle");
//! assert!(err.is_state_error());
//! assert!(!err.is_surfaced());
//! ```

use thiserror::Error;

use crate::call::SessionId;

/// Result type alias for softphone core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Status code reported for requests that ran into their deadline
pub const TIMEOUT_STATUS_CODE: i32 = 408;

/// Status code reported for transport failures without a server response
pub const NETWORK_STATUS_CODE: i32 = 503;

/// Error types for softphone core operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Network and transport errors
    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("{operation} timed out after {duration_ms}ms")]
    OperationTimeout { operation: String, duration_ms: u64 },

    /// Signaling-level rejection from the engine or server
    #[error("Protocol error {code}: {reason}")]
    ProtocolError { code: i32, reason: String },

    /// State errors
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("Invalid or stale session handle: {session_id}")]
    InvalidSession { session_id: SessionId },

    #[error("Not registered with server")]
    NotRegistered,

    #[error("Call already in progress: {session_id}")]
    CallInProgress { session_id: SessionId },

    /// Audio resource errors
    #[error("Audio device error: {reason}")]
    AudioDeviceError { reason: String },

    #[error("Resource unavailable: {resource}")]
    ResourceUnavailable { resource: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Softphone core has been shut down")]
    CoreShutdown,

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    /// Create a network error
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self::NetworkError { reason: reason.into() }
    }

    /// Create a protocol error carrying the engine/server status code
    pub fn protocol_error(code: i32, reason: impl Into<String>) -> Self {
        Self::ProtocolError { code, reason: reason.into() }
    }

    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::OperationTimeout { operation: operation.into(), duration_ms }
    }

    /// Create a state error
    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState { operation: operation.into(), state: state.into() }
    }

    /// Create an audio device error
    pub fn audio_device_error(reason: impl Into<String>) -> Self {
        Self::AudioDeviceError { reason: reason.into() }
    }

    /// Create a resource unavailable error
    pub fn resource_unavailable(resource: impl Into<String>) -> Self {
        Self::ResourceUnavailable { resource: resource.into() }
    }

    /// Create a configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Numeric code stored as the account's last error and carried in events
    pub fn status_code(&self) -> i32 {
        match self {
            ClientError::ProtocolError { code, .. } => *code,
            ClientError::OperationTimeout { .. } => TIMEOUT_STATUS_CODE,
            ClientError::NetworkError { .. } => NETWORK_STATUS_CODE,
            _ => 0,
        }
    }

    /// Network and protocol failures force a transition and are always
    /// pushed to the host observer.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkError { .. }
                | ClientError::OperationTimeout { .. }
                | ClientError::ProtocolError { .. }
        )
    }

    /// Check if the command simply did not apply to the current state
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidState { .. }
                | ClientError::InvalidSession { .. }
                | ClientError::NotRegistered
                | ClientError::CallInProgress { .. }
        )
    }

    /// Check if the audio device refused the request
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            ClientError::AudioDeviceError { .. } | ClientError::ResourceUnavailable { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::NetworkError { .. } | ClientError::OperationTimeout { .. } => "network",

            ClientError::ProtocolError { .. } => "protocol",

            ClientError::InvalidState { .. }
            | ClientError::InvalidSession { .. }
            | ClientError::NotRegistered
            | ClientError::CallInProgress { .. } => "state",

            ClientError::AudioDeviceError { .. } | ClientError::ResourceUnavailable { .. } => {
                "resource"
            }

            ClientError::InvalidConfiguration { .. } => "configuration",

            ClientError::CoreShutdown | ClientError::InternalError { .. } => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ClientError::protocol_error(486, "Busy Here").status_code(), 486);
        assert_eq!(ClientError::timeout("register", 10_000).status_code(), TIMEOUT_STATUS_CODE);
        assert_eq!(ClientError::network_error("unreachable").status_code(), NETWORK_STATUS_CODE);
        assert_eq!(ClientError::NotRegistered.status_code(), 0);
    }

    #[test]
    fn test_taxonomy_is_disjoint() {
        let errors = vec![
            ClientError::network_error("down"),
            ClientError::timeout("answer", 5),
            ClientError::protocol_error(403, "Forbidden"),
            ClientError::invalid_state("hang_up", "Idle"),
            ClientError::InvalidSession { session_id: SessionId::new(7) },
            ClientError::audio_device_error("route busy"),
            ClientError::resource_unavailable("loudspeaker"),
        ];

        for err in errors {
            let flags = [err.is_surfaced(), err.is_state_error(), err.is_resource_error()];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{err:?}");
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = ClientError::timeout("register", 250);
        assert_eq!(err.to_string(), "register timed out after 250ms");

        let err = ClientError::invalid_state("answer", "Ending");
        assert_eq!(err.to_string(), "Cannot answer while Ending");
    }
}
