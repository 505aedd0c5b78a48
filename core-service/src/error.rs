use core_bridge::CallError;
use core_playback::PlaybackError;
use core_upload::UploadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Module call failed: {0}")]
    Call(#[from] CallError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),
}

impl CoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Call(e) => e.is_transient(),
            CoreError::Upload(e) => e.is_transient(),
            CoreError::Playback(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
