use core_bridge::{CallError, ChannelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload batch is empty")]
    EmptyBatch,

    #[error("Invalid upload job: {0}")]
    InvalidJob(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Bulk upload call failed: {0}")]
    Call(#[from] CallError),

    #[error("Failed to serialize upload jobs: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UploadError {
    /// Returns `true` if resubmitting the same batch may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Call(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Message reported by the module, if the module rejected the batch.
    pub fn module_message(&self) -> Option<String> {
        match self {
            UploadError::Call(err) => err.module_message(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
