//! Typed client over the module's known operations.

use crate::bridge::RpcBridge;
use crate::error::{CallError, Result};
use crate::operation::Operation;
use bridge_traits::HostValue;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

// ============================================================================
// Requests and responses
// ============================================================================

/// Arguments to `play`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayRequest {
    pub allocation_id: String,
    pub remote_path: String,
    pub auth_ticket: String,
    pub lookup_hash: String,
    pub is_live: bool,
}

impl PlayRequest {
    pub fn new(allocation_id: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            remote_path: remote_path.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_ticket(mut self, auth_ticket: impl Into<String>) -> Self {
        self.auth_ticket = auth_ticket.into();
        self
    }

    pub fn with_lookup_hash(mut self, lookup_hash: impl Into<String>) -> Self {
        self.lookup_hash = lookup_hash.into();
        self
    }

    pub fn live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    fn to_args(&self) -> Vec<HostValue> {
        vec![
            HostValue::from(self.allocation_id.as_str()),
            HostValue::from(self.remote_path.as_str()),
            HostValue::from(self.auth_ticket.as_str()),
            HostValue::from(self.lookup_hash.as_str()),
            HostValue::Bool(self.is_live),
        ]
    }
}

/// Arguments to `download`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub allocation_id: String,
    pub remote_path: String,
    pub auth_ticket: String,
    pub lookup_hash: String,
    pub thumbnail_only: bool,
    pub num_blocks: u32,
    pub local_path: String,
}

impl DownloadRequest {
    /// Full-resource download of the file a playback session points at.
    pub fn for_playback(play: &PlayRequest, num_blocks: u32) -> Self {
        Self {
            allocation_id: play.allocation_id.clone(),
            remote_path: play.remote_path.clone(),
            auth_ticket: play.auth_ticket.clone(),
            lookup_hash: play.lookup_hash.clone(),
            thumbnail_only: false,
            num_blocks,
            local_path: String::new(),
        }
    }

    fn to_args(&self) -> Vec<HostValue> {
        vec![
            HostValue::from(self.allocation_id.as_str()),
            HostValue::from(self.remote_path.as_str()),
            HostValue::from(self.auth_ticket.as_str()),
            HostValue::from(self.lookup_hash.as_str()),
            HostValue::Bool(self.thumbnail_only),
            HostValue::from(self.num_blocks),
            HostValue::from(self.local_path.as_str()),
        ]
    }
}

/// Result of `download`: a materialized resource URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Result of `multiUpload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiUploadResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wallet key material handed to `setWallet`.
#[derive(Clone, PartialEq, Eq)]
pub struct WalletCredentials {
    pub client_id: String,
    pub client_key: String,
    pub peer_public_key: String,
    pub public_key: String,
    pub private_key: String,
    pub mnemonic: String,
    pub is_split: bool,
}

impl WalletCredentials {
    fn to_args(&self) -> Vec<HostValue> {
        vec![
            HostValue::from(self.client_id.as_str()),
            HostValue::from(self.client_key.as_str()),
            HostValue::from(self.peer_public_key.as_str()),
            HostValue::from(self.public_key.as_str()),
            HostValue::from(self.private_key.as_str()),
            HostValue::from(self.mnemonic.as_str()),
            HostValue::Bool(self.is_split),
        ]
    }
}

impl fmt::Debug for WalletCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredentials")
            .field("client_id", &self.client_id)
            .field("public_key", &self.public_key)
            .field("client_key", &"[REDACTED]")
            .field("private_key", &"[REDACTED]")
            .field("mnemonic", &"[REDACTED]")
            .field("is_split", &self.is_split)
            .finish()
    }
}

// ============================================================================
// Client
// ============================================================================

/// Typed wrapper around [`RpcBridge`].
#[derive(Clone)]
pub struct SdkClient {
    bridge: RpcBridge,
}

impl SdkClient {
    pub fn new(bridge: RpcBridge) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &RpcBridge {
        &self.bridge
    }

    /// Starts a segment stream for a remote file.
    #[instrument(skip(self, request), fields(remote_path = %request.remote_path, live = request.is_live))]
    pub async fn play(&self, request: &PlayRequest) -> Result<()> {
        self.bridge
            .invoke(Operation::Play, request.to_args())
            .await
            .map(|_| ())
    }

    /// Fetches the next segment. `None` means the stream produced nothing.
    pub async fn get_next_segment(&self) -> Result<Option<Bytes>> {
        let value = self.bridge.invoke(Operation::GetNextSegment, vec![]).await?;
        if value.is_nullish() {
            return Ok(None);
        }

        let bytes = value.to_bytes().ok_or_else(|| CallError::UnexpectedResponse {
            operation: Operation::GetNextSegment.as_str().to_string(),
            expected: "bytes",
            actual: value.kind().to_string(),
        })?;
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    pub async fn stop(&self) -> Result<()> {
        self.bridge
            .invoke(Operation::Stop, vec![])
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, request), fields(remote_path = %request.remote_path))]
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        let value = self
            .bridge
            .invoke(Operation::Download, request.to_args())
            .await?;
        decode_json(Operation::Download, value, "{url}")
    }

    /// Submits a serialized bulk-upload job list.
    #[instrument(skip(self, job_list_json), fields(len = job_list_json.len()))]
    pub async fn multi_upload(&self, job_list_json: String) -> Result<MultiUploadResult> {
        let value = self
            .bridge
            .invoke(Operation::MultiUpload, vec![HostValue::String(job_list_json)])
            .await?;
        if value.is_nullish() {
            return Ok(MultiUploadResult::default());
        }
        decode_json(Operation::MultiUpload, value, "{success, error}")
    }

    #[instrument(skip(self, credentials), fields(client_id = %credentials.client_id))]
    pub async fn set_wallet(&self, credentials: &WalletCredentials) -> Result<()> {
        self.bridge
            .invoke(Operation::SetWallet, credentials.to_args())
            .await
            .map(|_| ())
    }
}

impl fmt::Debug for SdkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkClient")
            .field("module", &self.bridge.handle().state())
            .finish()
    }
}

/// Decodes a structured result; string results are parsed as JSON text.
fn decode_json<T: DeserializeOwned>(
    operation: Operation,
    value: HostValue,
    expected: &'static str,
) -> Result<T> {
    let unexpected = |actual: String| CallError::UnexpectedResponse {
        operation: operation.as_str().to_string(),
        expected,
        actual,
    };

    match value {
        HostValue::Json(json) => serde_json::from_value(json).map_err(|e| unexpected(e.to_string())),
        HostValue::String(text) => {
            serde_json::from_str(&text).map_err(|e| unexpected(e.to_string()))
        }
        other => Err(unexpected(other.kind().to_string())),
    }
}
