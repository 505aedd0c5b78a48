//! # Playback Error Types

use bridge_traits::BridgeError;
use core_bridge::CallError;
use thiserror::Error;

/// Errors that can occur while driving a streaming session.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// A segment could not be fetched, repackaged or appended.
    #[error("Segment transfer failed: {0}")]
    TransferError(String),

    /// The segment pump gave up after exhausting its retry budget.
    #[error("Retry budget exhausted after {attempts} attempt(s): {last_error}")]
    RetryBudgetExhausted { attempts: u32, last_error: String },

    // ========================================================================
    // Format Errors
    // ========================================================================
    /// No compatible codec for the detected container.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// A module call failed outside the segment pump.
    #[error("Module call failed: {0}")]
    Call(#[from] CallError),

    /// The presentation pipeline rejected an operation.
    #[error("Presentation error: {0}")]
    Presentation(#[from] BridgeError),

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// The operation is not valid in the session's current state.
    #[error("Invalid playback state: {0}")]
    InvalidState(String),

    /// Player configuration is invalid.
    #[error("Invalid player configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::TransferError(_) => true,
            PlaybackError::Call(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this error is related to container or codec support.
    pub fn is_format_error(&self) -> bool {
        matches!(self, PlaybackError::UnsupportedFormat(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
