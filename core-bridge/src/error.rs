//! # Bridge Error Types

use crate::handle::ModuleState;
use bridge_traits::HostValue;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by module calls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// The module handle has exited or was never loaded successfully.
    #[error("Module is not active")]
    ModuleInactive,

    /// Arguments were passed to a member that is not callable.
    #[error("Invalid usage: '{operation}' is not callable but received {arg_count} argument(s)")]
    InvalidUsage { operation: String, arg_count: usize },

    /// The module reported a failure. `payload` is what crossed the boundary.
    #[error("Module error in '{operation}': {payload}")]
    ModuleError { operation: String, payload: HostValue },

    /// The module did not become ready within the configured timeout.
    #[error("Module not ready after {waited:?}")]
    ReadinessTimeout { waited: Duration },

    /// The module answered with a value of the wrong shape.
    #[error("Unexpected response from '{operation}': expected {expected}, got {actual}")]
    UnexpectedResponse {
        operation: String,
        expected: &'static str,
        actual: String,
    },
}

impl CallError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::ReadinessTimeout { .. })
    }

    /// Structured payload of a module error.
    pub fn payload(&self) -> Option<&HostValue> {
        match self {
            CallError::ModuleError { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Best-effort human-readable message from a module error payload.
    ///
    /// Prefers the `error` field of an object payload, falling back to the
    /// payload's display form.
    pub fn module_message(&self) -> Option<String> {
        let payload = self.payload()?;
        match payload.field("error") {
            Some(serde_json::Value::String(message)) => Some(message.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(payload.to_string()),
        }
    }
}

/// Errors raised by the channel registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Channel identifier space exhausted")]
    Exhausted,

    #[error("Channel identifier already active: {0}")]
    Collision(String),
}

/// Illegal module lifecycle transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid module transition from {from} to {to}")]
pub struct TransitionError {
    pub from: ModuleState,
    pub to: ModuleState,
}

pub type Result<T> = std::result::Result<T, CallError>;
