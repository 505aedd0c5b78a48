//! # Upload Jobs
//!
//! An [`UploadJob`] is what the caller submits: a file handle plus upload
//! options. An [`UploadJobDescriptor`] is what crosses into the module: the
//! same options with every host callback replaced by its channel identifier.
//!
//! ## Wire format
//!
//! Descriptors serialize with the module's bulk-upload option names
//! (`allocationId`, `remotePath`, `readChunkFuncName`, ...). Thumbnails travel
//! as comma-separated decimal bytes.

use crate::error::{Result, UploadError};
use crate::progress::ProgressCallback;
use bridge_traits::FileHandle;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Chunk count used when the caller does not choose one.
pub const DEFAULT_NUM_BLOCKS: u32 = 100;

// ============================================================================
// Caller-facing job
// ============================================================================

/// Per-file upload options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub encrypt: bool,
    pub webstreaming: bool,
    pub is_update: bool,
    pub is_repair: bool,
    pub num_blocks: u32,
    pub mime_type: Option<String>,
    pub custom_meta: Option<String>,
    pub memory_storer: bool,
    pub thumbnail: Option<Bytes>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            webstreaming: false,
            is_update: false,
            is_repair: false,
            num_blocks: DEFAULT_NUM_BLOCKS,
            mime_type: None,
            custom_meta: None,
            memory_storer: false,
            thumbnail: None,
        }
    }
}

/// A single file to upload.
#[derive(Clone)]
pub struct UploadJob {
    pub allocation_id: String,
    pub remote_path: String,
    pub file: Arc<dyn FileHandle>,
    pub options: UploadOptions,
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl UploadJob {
    pub fn new(
        allocation_id: impl Into<String>,
        remote_path: impl Into<String>,
        file: Arc<dyn FileHandle>,
    ) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            remote_path: remote_path.into(),
            file,
            options: UploadOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn encrypted(mut self, encrypt: bool) -> Self {
        self.options.encrypt = encrypt;
        self
    }

    pub fn webstreaming(mut self, webstreaming: bool) -> Self {
        self.options.webstreaming = webstreaming;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.options.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<Bytes>) -> Self {
        self.options.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_num_blocks(mut self, num_blocks: u32) -> Self {
        self.options.num_blocks = num_blocks;
        self
    }

    /// Checks the fields the module cannot proceed without.
    pub fn validate(&self) -> Result<()> {
        if self.allocation_id.trim().is_empty() {
            return Err(UploadError::InvalidJob(
                "allocation id must not be empty".to_string(),
            ));
        }
        if self.remote_path.trim().is_empty() {
            return Err(UploadError::InvalidJob(format!(
                "remote path for '{}' must not be empty",
                self.file.name()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for UploadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadJob")
            .field("allocation_id", &self.allocation_id)
            .field("remote_path", &self.remote_path)
            .field("file", &self.file.name())
            .field("size", &self.file.size())
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

// ============================================================================
// Wire descriptor
// ============================================================================

/// Serialized form of a job as the module's bulk-upload operation reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJobDescriptor {
    pub allocation_id: String,
    pub remote_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbnail_bytes: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub webstreaming: bool,
    #[serde(default)]
    pub is_update: bool,
    #[serde(default)]
    pub is_repair: bool,
    pub num_blocks: u32,
    pub file_size: u64,
    pub read_chunk_func_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_func_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash_func_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub memory_storer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_meta: Option<String>,
}

impl UploadJobDescriptor {
    /// Describes `job`, reading through the channel `reader_id`.
    pub fn new(job: &UploadJob, reader_id: impl Into<String>) -> Self {
        let options = &job.options;
        Self {
            allocation_id: job.allocation_id.clone(),
            remote_path: job.remote_path.clone(),
            thumbnail_bytes: options
                .thumbnail
                .as_deref()
                .map(render_thumbnail)
                .unwrap_or_default(),
            encrypt: options.encrypt,
            webstreaming: options.webstreaming,
            is_update: options.is_update,
            is_repair: options.is_repair,
            num_blocks: options.num_blocks,
            file_size: job.file.size(),
            read_chunk_func_name: reader_id.into(),
            callback_func_name: None,
            md5_hash_func_name: None,
            mime_type: options.mime_type.clone(),
            memory_storer: options.memory_storer,
            custom_meta: options.custom_meta.clone(),
        }
    }

    /// Every channel identifier the descriptor references.
    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.read_chunk_func_name.as_str())
            .chain(self.callback_func_name.as_deref())
            .chain(self.md5_hash_func_name.as_deref())
    }
}

/// `[1, 2, 255]` -> `"1,2,255"`.
pub fn render_thumbnail(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubFile;

    #[async_trait]
    impl FileHandle for StubFile {
        fn name(&self) -> &str {
            "song.flac"
        }

        fn size(&self) -> u64 {
            2048
        }

        async fn read_range(&self, _offset: u64, _length: u64) -> bridge_traits::error::Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn test_descriptor_uses_module_field_names() {
        let job = UploadJob::new("alloc-1", "/music/song.flac", Arc::new(StubFile))
            .with_thumbnail(vec![1u8, 2, 255])
            .with_mime_type("audio/flac");
        let mut descriptor = UploadJobDescriptor::new(&job, "__zcn_upload_reader_0");
        descriptor.callback_func_name = Some("__zcn_upload_callback_1".to_string());

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["allocationId"], json!("alloc-1"));
        assert_eq!(value["remotePath"], json!("/music/song.flac"));
        assert_eq!(value["thumbnailBytes"], json!("1,2,255"));
        assert_eq!(value["fileSize"], json!(2048));
        assert_eq!(value["numBlocks"], json!(DEFAULT_NUM_BLOCKS));
        assert_eq!(value["readChunkFuncName"], json!("__zcn_upload_reader_0"));
        assert_eq!(value["callbackFuncName"], json!("__zcn_upload_callback_1"));
        assert_eq!(value["mimeType"], json!("audio/flac"));
        assert!(value.get("md5HashFuncName").is_none());

        assert_eq!(descriptor.channel_ids().count(), 2);
    }

    #[test]
    fn test_validate() {
        let job = UploadJob::new("", "/a", Arc::new(StubFile));
        assert!(matches!(job.validate(), Err(UploadError::InvalidJob(_))));

        let job = UploadJob::new("alloc", " ", Arc::new(StubFile));
        assert!(job.validate().is_err());

        let job = UploadJob::new("alloc", "/a", Arc::new(StubFile));
        assert!(job.validate().is_ok());
    }
}
