//! Segment fetching with retry and backoff, and the pull loop that feeds a
//! media source.

use crate::config::RetryPolicy;
use crate::error::{PlaybackError, Result};
use crate::session::PlaybackSession;
use bridge_traits::playback::{
    MediaPipeline, MediaSource, PresentationElement, SourceBuffer, Transmuxer,
};
use bytes::Bytes;
use core_bridge::SdkClient;
use core_runtime::events::PlaybackEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Fetcher
// ============================================================================

/// Result of one fetch attempt sequence.
#[derive(Debug)]
pub(crate) enum Fetched {
    Segment(Bytes),
    /// The module returned nothing (null or zero length).
    Empty,
    /// Cancellation was observed.
    Stopped,
}

/// Pulls segments one at a time, retrying failures under a [`RetryPolicy`].
pub(crate) struct SegmentFetcher {
    client: SdkClient,
    session: Arc<PlaybackSession>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    failures: u32,
}

impl SegmentFetcher {
    pub(crate) fn new(
        client: SdkClient,
        session: Arc<PlaybackSession>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            session,
            policy,
            cancel,
            failures: 0,
        }
    }

    /// Fetches the next segment, retrying transfer errors with backoff.
    ///
    /// Fails only with [`PlaybackError::RetryBudgetExhausted`], which an
    /// unbounded policy never produces.
    pub(crate) async fn next(&mut self) -> Result<Fetched> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Fetched::Stopped);
            }

            let outcome = {
                let _fetch = self.session.begin_fetch();
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Ok(Fetched::Stopped),
                    outcome = self.client.get_next_segment() => outcome,
                }
            };

            match outcome {
                Ok(Some(segment)) => {
                    self.failures = 0;
                    return Ok(Fetched::Segment(segment));
                }
                Ok(None) => {
                    self.failures = 0;
                    return Ok(Fetched::Empty);
                }
                Err(e) => {
                    let error = PlaybackError::TransferError(e.to_string());
                    if !self.back_off(error).await? {
                        return Ok(Fetched::Stopped);
                    }
                }
            }
        }
    }

    /// Counts a failure and sleeps out its backoff.
    ///
    /// Returns `Ok(false)` if cancelled while waiting.
    pub(crate) async fn back_off(&mut self, error: PlaybackError) -> Result<bool> {
        self.failures = self.failures.saturating_add(1);
        let attempt = self.failures;

        if !self.policy.allows(attempt) {
            return Err(PlaybackError::RetryBudgetExhausted {
                attempts: attempt,
                last_error: error.to_string(),
            });
        }

        let delay = self.policy.backoff_for(attempt);
        warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Segment transfer failed, retrying");
        self.session.record_retry();
        self.session.publish(PlaybackEvent::SegmentRetry {
            attempt,
            message: error.to_string(),
        });

        Ok(self.sleep(delay).await)
    }

    /// Sleeps unless cancelled first. Returns `false` on cancellation.
    pub(crate) async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

// ============================================================================
// Pump
// ============================================================================

/// How fetched segments are turned into appendable buffers.
pub(crate) enum SegmentSink {
    /// Already fragmented; appended as fetched. An empty segment ends the stream.
    Chunk,
    /// Repackaged first. Empty segments are polled again.
    Live {
        transmuxer: Box<dyn Transmuxer>,
        poll_interval: Duration,
        /// Playback has started and the object URL was revoked.
        started: bool,
    },
}

/// Single-consumer pull loop: wait for the buffer, fetch, append, repeat.
pub(crate) struct SegmentPump {
    pub(crate) fetcher: SegmentFetcher,
    pub(crate) source: Box<dyn MediaSource>,
    pub(crate) buffer: Box<dyn SourceBuffer>,
    pub(crate) sink: SegmentSink,
    pub(crate) element: Arc<dyn PresentationElement>,
    pub(crate) pipeline: Arc<dyn MediaPipeline>,
}

impl SegmentPump {
    pub(crate) async fn run(mut self) {
        let session = Arc::clone(&self.fetcher.session);

        loop {
            if !self.wait_ready().await {
                break;
            }

            let fetched = match self.fetcher.next().await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(error = %e, "Segment pump giving up");
                    session.fail(e.to_string());
                    break;
                }
            };

            match fetched {
                Fetched::Segment(segment) => {
                    if let Err(e) = self.deliver(segment).await {
                        match self.fetcher.back_off(e).await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                warn!(error = %e, "Segment pump giving up");
                                session.fail(e.to_string());
                                break;
                            }
                        }
                    }
                }
                Fetched::Empty => {
                    if let SegmentSink::Live { poll_interval, .. } = &self.sink {
                        let delay = *poll_interval;
                        session.record_empty_poll();
                        debug!(delay_ms = delay.as_millis() as u64, "Empty live segment, polling again");
                        if self.fetcher.sleep(delay).await {
                            continue;
                        }
                        break;
                    }
                    self.finish().await;
                    break;
                }
                Fetched::Stopped => break,
            }
        }

        debug!(stats = ?session.stats(), "Segment pump exited");
    }

    /// Waits until the buffer can take more data. `false` on cancellation.
    ///
    /// A failing readiness signal is treated like an idle buffer; the next
    /// append reports the real error.
    async fn wait_ready(&mut self) -> bool {
        let cancel = self.fetcher.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            ready = self.buffer.ready() => {
                if let Err(e) = ready {
                    debug!(error = %e, "Source buffer readiness failed");
                }
                true
            }
        }
    }

    async fn deliver(&mut self, segment: Bytes) -> Result<()> {
        let buffers = match &mut self.sink {
            SegmentSink::Chunk => vec![segment],
            SegmentSink::Live { transmuxer, .. } => transmuxer
                .push(&segment)
                .map_err(|e| PlaybackError::TransferError(format!("transmux failed: {}", e)))?
                .into_iter()
                .map(|out| out.into_appendable())
                .collect(),
        };

        for data in buffers {
            if !self.wait_ready().await {
                return Ok(());
            }
            self.append(data)?;
        }

        self.start_live_playback().await;
        Ok(())
    }

    fn append(&mut self, data: Bytes) -> Result<()> {
        let len = data.len();
        self.buffer
            .append(data)
            .map_err(|e| PlaybackError::TransferError(format!("append failed: {}", e)))?;
        let session = &self.fetcher.session;
        session.record_append(len);
        session.publish(PlaybackEvent::SegmentAppended { bytes: len });
        Ok(())
    }

    /// After the first live append: start playback, then revoke the object URL.
    async fn start_live_playback(&mut self) {
        let started = match &mut self.sink {
            SegmentSink::Live { started, .. } => started,
            SegmentSink::Chunk => return,
        };
        if *started || self.fetcher.session.stats().segments_appended == 0 {
            return;
        }
        *started = true;

        match self.element.play().await {
            Ok(outcome) => debug!(?outcome, "Live playback started"),
            Err(e) => warn!(error = %e, "Live playback did not start"),
        }
        if let Some(url) = self.fetcher.session.take_bound_url() {
            self.pipeline.revoke_object_url(&url);
            debug!(url = %url, "Revoked live object URL");
        }
    }

    /// End of a finite stream: close the source once the buffer is idle.
    async fn finish(&mut self) {
        if !self.wait_ready().await {
            return;
        }
        if !self.buffer.is_updating() && self.source.is_open() {
            if let Err(e) = self.source.end_of_stream() {
                warn!(error = %e, "Failed to signal end of stream");
            }
        }
        info!(url = self.source.object_url(), "Stream complete");
        self.fetcher.session.publish(PlaybackEvent::EndOfStream);
    }
}
