use thiserror::Error;

use super::state::SessionState;

/// Errors raised by the recording engine and its platform backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceUnavailable,

    #[error("encoding failed: {0}")]
    EncodingFailure(String),

    #[error("cannot {operation} while {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    pub fn invalid_transition(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidStateTransition { operation, state }
    }

    /// Whether the error came from the platform refusing or lacking a device.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::DeviceUnavailable)
    }
}
