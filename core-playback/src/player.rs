//! # Streaming Player
//!
//! Drives one playback session: asks the module to start a segment stream,
//! picks a delivery mode and feeds the presentation pipeline.
//!
//! ## Modes
//!
//! ```text
//!                 is_live?
//!                 ├── yes ─────────────────────────────> LiveStreaming
//!                 └── no ── fetch first segment, probe
//!                           ├── fragmented + supported ─> ChunkStreaming
//!                           └── otherwise ─────────────> Downloading
//! ```
//!
//! Streaming modes run a single pump task that never has more than one
//! segment fetch in flight. Downloading hands a fully materialized URL to
//! the element and never fetches segments again.
//!
//! ## Usage
//!
//! ```ignore
//! let player = StreamingPlayer::new(client, element, pipeline, probe, transmuxers, PlayerConfig::default())?;
//! let mode = player
//!     .start(PlaybackRequest::new(PlayRequest::new("alloc", "/movies/a.mp4"), "video/mp4"))
//!     .await?;
//! // ...
//! player.stop().await?;
//! ```

use crate::config::PlayerConfig;
use crate::error::{PlaybackError, Result};
use crate::probe::ContainerProbe;
use crate::pump::{Fetched, SegmentFetcher, SegmentPump, SegmentSink};
use crate::session::{PlaybackMode, PlaybackSession, PlaybackState, SessionStats};
use bridge_traits::playback::{
    MediaPipeline, MediaSource, PlayOutcome, PresentationElement, SourceBuffer, TransmuxerFactory,
};
use bytes::Bytes;
use core_bridge::{DownloadRequest, PlayRequest, SdkClient};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What to play and how the caller labels it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub play: PlayRequest,
    /// Container mime type of the remote file, used for probing and fallbacks.
    pub mime_type: String,
}

impl PlaybackRequest {
    pub fn new(play: PlayRequest, mime_type: impl Into<String>) -> Self {
        Self {
            play,
            mime_type: mime_type.into(),
        }
    }
}

/// One streaming session against the module.
///
/// A player is single-use: once stopped or failed, create a new one.
pub struct StreamingPlayer {
    client: SdkClient,
    element: Arc<dyn PresentationElement>,
    pipeline: Arc<dyn MediaPipeline>,
    probe: Arc<dyn ContainerProbe>,
    transmuxers: Arc<dyn TransmuxerFactory>,
    config: PlayerConfig,
    session: Arc<PlaybackSession>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingPlayer {
    pub fn new(
        client: SdkClient,
        element: Arc<dyn PresentationElement>,
        pipeline: Arc<dyn MediaPipeline>,
        probe: Arc<dyn ContainerProbe>,
        transmuxers: Arc<dyn TransmuxerFactory>,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            element,
            pipeline,
            probe,
            transmuxers,
            config,
            session: Arc::new(PlaybackSession::new()),
            cancel: CancellationToken::new(),
            pump: Mutex::new(None),
        })
    }

    /// Publishes session transitions on `events`. Call before [`start`](Self::start).
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.session = Arc::new(PlaybackSession::with_events(events));
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state()
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.session.mode()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.session.subscribe()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Starts playback and returns the selected mode.
    ///
    /// Streaming continues in the background after this returns.
    #[instrument(skip(self, request), fields(remote_path = %request.play.remote_path, live = request.play.is_live))]
    pub async fn start(&self, request: PlaybackRequest) -> Result<PlaybackMode> {
        self.session
            .transition(PlaybackState::Idle, PlaybackState::Starting)
            .map_err(|state| {
                PlaybackError::InvalidState(format!("cannot start a {} session", state))
            })?;

        let started = if request.play.is_live {
            self.start_live(&request).await
        } else {
            self.start_on_demand(&request).await
        };

        match started {
            Ok(mode) => {
                if let Err(state) = self
                    .session
                    .transition(PlaybackState::Starting, PlaybackState::Active)
                {
                    debug!(%state, "Session left Starting before activation");
                }
                info!(%mode, "Playback started");
                Ok(mode)
            }
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    warn!(error = %e, "Playback failed to start");
                    self.session.fail(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn start_live(&self, request: &PlaybackRequest) -> Result<PlaybackMode> {
        let mime_codecs = self.config.live_mime_codecs.clone();
        if !self.pipeline.is_type_supported(&mime_codecs) {
            return Err(PlaybackError::UnsupportedFormat(mime_codecs));
        }

        self.client.play(&request.play).await?;
        self.ensure_running()?;
        self.session.set_mode(PlaybackMode::LiveStreaming);

        let (source, buffer) = self.attach_media_source(&mime_codecs).await?;
        self.spawn_pump(
            source,
            buffer,
            SegmentSink::Live {
                transmuxer: self.transmuxers.create(),
                poll_interval: self.config.live_poll_interval,
                started: false,
            },
        );
        Ok(PlaybackMode::LiveStreaming)
    }

    async fn start_on_demand(&self, request: &PlaybackRequest) -> Result<PlaybackMode> {
        self.client.play(&request.play).await?;

        let mut fetcher = self.fetcher();
        let first = match fetcher.next().await? {
            Fetched::Segment(segment) => Some(segment),
            Fetched::Empty => None,
            Fetched::Stopped => return Err(Self::stopped_while_starting()),
        };
        self.ensure_running()?;

        if let Some(segment) = first {
            let info = self.probe.probe(&request.mime_type, &segment);
            debug!(%info, "Probed first segment");

            if info.is_fragmented && self.pipeline.is_type_supported(&info.mime_codecs) {
                self.session.set_mode(PlaybackMode::ChunkStreaming);
                self.start_chunk_streaming(&info.mime_codecs, segment).await?;
                return Ok(PlaybackMode::ChunkStreaming);
            }
        }

        self.session.set_mode(PlaybackMode::Downloading);
        self.start_download(request).await?;
        Ok(PlaybackMode::Downloading)
    }

    async fn start_chunk_streaming(&self, mime_codecs: &str, first: Bytes) -> Result<()> {
        let (source, mut buffer) = self.attach_media_source(mime_codecs).await?;

        let len = first.len();
        buffer.append(first)?;
        self.session.record_append(len);

        match self.element.play().await {
            Ok(outcome) => debug!(?outcome, "Element play requested"),
            Err(e) => warn!(error = %e, "Element play failed"),
        }

        self.spawn_pump(source, buffer, SegmentSink::Chunk);
        Ok(())
    }

    async fn start_download(&self, request: &PlaybackRequest) -> Result<()> {
        if let Err(e) = self.client.stop().await {
            warn!(error = %e, "Module stop failed before download fallback");
        }

        let download = DownloadRequest::for_playback(&request.play, self.config.download_num_blocks);
        let response = self.client.download(&download).await?;
        self.ensure_running()?;

        self.element.set_cross_origin(&self.config.cross_origin);
        self.element.set_source(&response.url)?;
        self.session.bind_url(response.url.clone());

        match self.element.play().await? {
            PlayOutcome::Playing => Ok(()),
            PlayOutcome::AutoplayBlocked => {
                info!("Autoplay blocked, rebuilding as muted loop");
                self.element
                    .rebuild_muted_loop(&response.url, &request.mime_type)?;
                Ok(())
            }
            PlayOutcome::Unsupported => {
                Err(PlaybackError::UnsupportedFormat(request.mime_type.clone()))
            }
        }
    }

    /// Creates a media source, binds its URL to the element and adds a buffer.
    async fn attach_media_source(
        &self,
        mime_codecs: &str,
    ) -> Result<(Box<dyn MediaSource>, Box<dyn SourceBuffer>)> {
        let source = self.pipeline.create_media_source()?;
        let url = source.object_url().to_string();
        self.session.bind_url(url.clone());

        self.element.set_cross_origin(&self.config.cross_origin);
        self.element.set_source(&url)?;
        source.opened().await?;
        self.ensure_running()?;

        let buffer = source.add_source_buffer(mime_codecs)?;
        Ok((source, buffer))
    }

    fn fetcher(&self) -> SegmentFetcher {
        SegmentFetcher::new(
            self.client.clone(),
            Arc::clone(&self.session),
            self.config.retry.clone(),
            self.cancel.clone(),
        )
    }

    fn spawn_pump(
        &self,
        source: Box<dyn MediaSource>,
        buffer: Box<dyn SourceBuffer>,
        sink: SegmentSink,
    ) {
        let pump = SegmentPump {
            fetcher: self.fetcher(),
            source,
            buffer,
            sink,
            element: Arc::clone(&self.element),
            pipeline: Arc::clone(&self.pipeline),
        };
        *self.pump.lock() = Some(tokio::spawn(pump.run()));
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Self::stopped_while_starting())
        } else {
            Ok(())
        }
    }

    fn stopped_while_starting() -> PlaybackError {
        PlaybackError::InvalidState("session stopped while starting".to_string())
    }

    // ========================================================================
    // Stop
    // ========================================================================

    /// Tears the session down.
    ///
    /// Order: cancel the pump, stop the module stream, pause the element,
    /// revoke the bound URL, wait for the pump. A failed session keeps its
    /// `Failed` state.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let state = self.session.state();
        if matches!(state, PlaybackState::Idle | PlaybackState::Stopped) {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();

        if let Err(e) = self.client.stop().await {
            warn!(error = %e, "Module stop failed during teardown");
        }
        self.element.pause();

        if let Some(url) = self.session.take_bound_url() {
            self.pipeline.revoke_object_url(&url);
            debug!(url = %url, "Revoked bound URL");
        }

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(error = %e, "Segment pump task ended abnormally");
            }
        }

        if self.session.state() != PlaybackState::Failed {
            self.session.set_state(PlaybackState::Stopped);
        }
        info!(stats = ?self.session.stats(), "Playback stopped");
        Ok(())
    }
}

impl fmt::Debug for StreamingPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingPlayer")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for StreamingPlayer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
