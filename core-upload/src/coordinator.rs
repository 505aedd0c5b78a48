//! # Upload Coordinator
//!
//! Drives one bulk-upload call per batch.
//!
//! ## Workflow
//!
//! 1. Allocate a reader channel per job, answering `(offset, length)` from the
//!    caller's file handle
//! 2. Allocate a hash channel for files above the hash threshold and start the
//!    digest worker
//! 3. Allocate a progress channel for jobs with a callback
//! 4. Serialize the descriptors and call `multiUpload`
//! 5. Release every channel of the batch, whatever the outcome
//!
//! Dropping the `submit` future mid-flight also releases the batch.

use crate::error::{Result, UploadError};
use crate::handlers::{HashChannel, ProgressChannel, ReaderChannel};
use crate::job::{UploadJob, UploadJobDescriptor};
use bridge_traits::DigestWorker;
use core_bridge::{ChannelBatch, ChannelRegistry, ChannelRole, MultiUploadResult, SdkClient};
use core_runtime::events::{BridgeEvent, EventBus, UploadEvent};
use core_runtime::BridgeConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Coordinates multi-file uploads through the module.
pub struct UploadCoordinator {
    client: SdkClient,
    registry: Arc<ChannelRegistry>,
    digest: Arc<dyn DigestWorker>,
    hash_threshold_bytes: u64,
    events: Option<EventBus>,
}

impl UploadCoordinator {
    pub fn new(
        client: SdkClient,
        registry: Arc<ChannelRegistry>,
        digest: Arc<dyn DigestWorker>,
        config: &BridgeConfig,
    ) -> Self {
        if digest.algorithm() != config.digest_algorithm {
            warn!(
                worker = %digest.algorithm(),
                configured = %config.digest_algorithm,
                "Digest worker algorithm differs from configuration"
            );
        }
        Self {
            client,
            registry,
            digest,
            hash_threshold_bytes: config.hash_threshold_bytes,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Uploads a batch of files in a single module call.
    ///
    /// # Errors
    ///
    /// - [`UploadError::EmptyBatch`] without contacting the module
    /// - [`UploadError::InvalidJob`] if a job is missing its allocation or path
    /// - [`UploadError::Call`] if the module rejects the batch
    ///
    /// Channels are released before returning in every case.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn submit(&self, jobs: Vec<UploadJob>) -> Result<MultiUploadResult> {
        if jobs.is_empty() {
            return Err(UploadError::EmptyBatch);
        }
        for job in &jobs {
            job.validate()?;
        }

        let mut batch = ChannelBatch::new(Arc::clone(&self.registry));
        let batch_id = batch.id().to_string();

        let outcome = self.run_batch(&mut batch, &jobs).await;

        let released = batch.release_all();
        debug!(batch = %batch_id, released, "Upload batch settled");

        match &outcome {
            Ok(result) => {
                info!(batch = %batch_id, success = result.success, "Bulk upload finished");
                self.publish(UploadEvent::Settled {
                    batch_id,
                    success: result.success,
                    error: result.error.clone().filter(|e| !e.is_empty()),
                });
            }
            Err(err) => {
                warn!(batch = %batch_id, error = %err, "Bulk upload failed");
                self.publish(UploadEvent::Settled {
                    batch_id,
                    success: false,
                    error: Some(err.module_message().unwrap_or_else(|| err.to_string())),
                });
            }
        }
        outcome
    }

    async fn run_batch(
        &self,
        batch: &mut ChannelBatch,
        jobs: &[UploadJob],
    ) -> Result<MultiUploadResult> {
        let descriptors = jobs
            .iter()
            .map(|job| self.wire_job(batch, job))
            .collect::<Result<Vec<_>>>()?;
        let payload = serde_json::to_string(&descriptors)?;

        self.publish(UploadEvent::Submitted {
            batch_id: batch.id().to_string(),
            job_count: descriptors.len(),
        });
        debug!(
            batch = %batch.id(),
            channels = batch.channel_ids().len(),
            "Submitting bulk upload"
        );

        Ok(self.client.multi_upload(payload).await?)
    }

    fn wire_job(&self, batch: &mut ChannelBatch, job: &UploadJob) -> Result<UploadJobDescriptor> {
        let reader = batch.open(
            ChannelRole::Reader,
            Arc::new(ReaderChannel::new(Arc::clone(&job.file))),
        )?;
        let mut descriptor = UploadJobDescriptor::new(job, reader.id);

        if job.file.size() > self.hash_threshold_bytes {
            // Secure the id before a worker starts reading the file.
            let hash = batch.reserve(ChannelRole::Hash)?;
            let receiver = self.digest.start(Arc::clone(&job.file));
            batch.attach(&hash, Arc::new(HashChannel::new(receiver)))?;
            debug!(
                file = job.file.name(),
                size = job.file.size(),
                algorithm = %self.digest.algorithm(),
                "Hashing large file"
            );
            descriptor.md5_hash_func_name = Some(hash.id);
        }

        if let Some(callback) = &job.progress {
            let progress = batch.open(
                ChannelRole::Progress,
                Arc::new(ProgressChannel::new(Arc::clone(callback))),
            )?;
            descriptor.callback_func_name = Some(progress.id);
        }

        Ok(descriptor)
    }

    fn publish(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            events.publish(BridgeEvent::Upload(event));
        }
    }
}
