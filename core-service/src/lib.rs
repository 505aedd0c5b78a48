//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided implementations (module loader, digest
//! worker, presentation pipeline) into the bridge core. Desktop hosts
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) to get the thread-backed digest worker and the built-in
//! container probe by default.
//!
//! ```ignore
//! let deps = CoreDependencies::desktop(loader, element, pipeline, transmuxers);
//! let core = CoreService::new(deps, ServiceConfig::default())?;
//!
//! core.set_wallet(&credentials).await?;
//! let result = core.bulk_upload(jobs).await?;
//! let mode = core.start_playback(request).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_bridge::{
    DownloadRequest, ModuleState, MultiUploadResult, PlayRequest, SdkClient, WalletCredentials,
};
pub use core_playback::{
    PlaybackMode, PlaybackRequest, PlaybackState, PlayerConfig, RetryPolicy, StreamingPlayer,
};
pub use core_runtime::events::{BridgeEvent, EventBus, Receiver};
pub use core_runtime::logging::{init_logging, LoggingConfig};
pub use core_runtime::BridgeConfig;
pub use core_upload::{ProgressCallback, ProgressEvent, UploadJob, UploadOptions};

use bridge_traits::playback::{MediaPipeline, PresentationElement, TransmuxerFactory};
use bridge_traits::{DigestWorker, HostCallDispatch, ModuleLoader};
use core_bridge::{ChannelRegistry, ModuleHandle, RpcBridge};
use core_playback::ContainerProbe;
use core_upload::UploadCoordinator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Aggregated handle to all host collaborators the core requires.
pub struct CoreDependencies {
    pub loader: Arc<dyn ModuleLoader>,
    pub digest_worker: Arc<dyn DigestWorker>,
    pub element: Arc<dyn PresentationElement>,
    pub pipeline: Arc<dyn MediaPipeline>,
    pub probe: Arc<dyn ContainerProbe>,
    pub transmuxers: Arc<dyn TransmuxerFactory>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        digest_worker: Arc<dyn DigestWorker>,
        element: Arc<dyn PresentationElement>,
        pipeline: Arc<dyn MediaPipeline>,
        probe: Arc<dyn ContainerProbe>,
        transmuxers: Arc<dyn TransmuxerFactory>,
    ) -> Self {
        Self {
            loader,
            digest_worker,
            element,
            pipeline,
            probe,
            transmuxers,
        }
    }

    /// Desktop defaults: MD5 hashing on a worker thread and the built-in
    /// MP4/WebM probe.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(
        loader: Arc<dyn ModuleLoader>,
        element: Arc<dyn PresentationElement>,
        pipeline: Arc<dyn MediaPipeline>,
        transmuxers: Arc<dyn TransmuxerFactory>,
    ) -> Self {
        Self::new(
            loader,
            Arc::new(bridge_desktop::ThreadDigestWorker::default()),
            element,
            pipeline,
            Arc::new(core_playback::DefaultContainerProbe),
            transmuxers,
        )
    }
}

/// Bridge and player settings for a [`CoreService`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        self.player.validate()?;
        Ok(())
    }
}

struct Inner {
    deps: CoreDependencies,
    config: ServiceConfig,
    events: EventBus,
    handle: Arc<ModuleHandle>,
    registry: Arc<ChannelRegistry>,
    client: SdkClient,
    uploads: UploadCoordinator,
    /// Serializes `set_wallet` across its module call.
    wallet_gate: tokio::sync::Mutex<()>,
    active_wallet: Mutex<Option<String>>,
    playback: Mutex<Option<Arc<StreamingPlayer>>>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Inner>,
}

impl CoreService {
    /// Builds the bridge and starts loading the module in the background.
    ///
    /// Must be called from within a tokio runtime. Calls issued before the
    /// module is ready wait for it.
    pub fn new(deps: CoreDependencies, config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.bridge.event_buffer_size);
        let handle = Arc::new(ModuleHandle::with_events(events.clone()));
        let registry = Arc::new(
            ChannelRegistry::new(config.bridge.channel_prefix.clone()).with_events(events.clone()),
        );

        handle
            .spawn_load(
                Arc::clone(&deps.loader),
                Arc::clone(&registry) as Arc<dyn HostCallDispatch>,
            )
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let client = SdkClient::new(RpcBridge::new(Arc::clone(&handle), &config.bridge));
        let uploads = UploadCoordinator::new(
            client.clone(),
            Arc::clone(&registry),
            Arc::clone(&deps.digest_worker),
            &config.bridge,
        )
        .with_events(events.clone());

        info!(prefix = %config.bridge.channel_prefix, "Core service initialized");

        Ok(Self {
            inner: Arc::new(Inner {
                deps,
                config,
                events,
                handle,
                registry,
                client,
                uploads,
                wallet_gate: tokio::sync::Mutex::new(()),
                active_wallet: Mutex::new(None),
                playback: Mutex::new(None),
            }),
        })
    }

    pub fn module_state(&self) -> ModuleState {
        self.inner.handle.state()
    }

    /// Subscribes to module, channel, upload and playback events.
    pub fn subscribe_events(&self) -> Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    pub fn client(&self) -> &SdkClient {
        &self.inner.client
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Uploads a batch of files through the module's bulk operation.
    pub async fn bulk_upload(&self, jobs: Vec<UploadJob>) -> Result<MultiUploadResult> {
        Ok(self.inner.uploads.submit(jobs).await?)
    }

    /// Installs wallet credentials in the module.
    ///
    /// Returns `false` without calling the module when the same client id is
    /// already active. Concurrent calls are applied one at a time.
    #[instrument(skip(self, credentials), fields(client_id = %credentials.client_id))]
    pub async fn set_wallet(&self, credentials: &WalletCredentials) -> Result<bool> {
        let _gate = self.inner.wallet_gate.lock().await;
        if self.inner.active_wallet.lock().as_deref() == Some(credentials.client_id.as_str()) {
            debug!("Wallet already active");
            return Ok(false);
        }

        self.inner.client.set_wallet(credentials).await?;
        *self.inner.active_wallet.lock() = Some(credentials.client_id.clone());
        info!("Wallet set");
        Ok(true)
    }

    /// Client id of the wallet last installed, if any.
    pub fn active_wallet(&self) -> Option<String> {
        self.inner.active_wallet.lock().clone()
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Starts a playback session, stopping any session already running.
    pub async fn start_playback(&self, request: PlaybackRequest) -> Result<PlaybackMode> {
        self.stop_playback().await?;

        let deps = &self.inner.deps;
        let player = Arc::new(
            StreamingPlayer::new(
                self.inner.client.clone(),
                Arc::clone(&deps.element),
                Arc::clone(&deps.pipeline),
                Arc::clone(&deps.probe),
                Arc::clone(&deps.transmuxers),
                self.inner.config.player.clone(),
            )?
            .with_events(self.inner.events.clone()),
        );

        let replaced = self.inner.playback.lock().replace(Arc::clone(&player));
        if let Some(previous) = replaced {
            // Another start raced this one in.
            previous.stop().await?;
        }

        Ok(player.start(request).await?)
    }

    /// Stops the current playback session, if any.
    pub async fn stop_playback(&self) -> Result<()> {
        let current = self.inner.playback.lock().take();
        if let Some(player) = current {
            player.stop().await?;
        }
        Ok(())
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.inner
            .playback
            .lock()
            .as_ref()
            .map(|player| player.state())
    }

    /// Stops playback and exits the module. Pending and later calls fail.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.stop_playback().await {
            warn!(error = %e, "Playback teardown failed during shutdown");
        }
        self.inner.handle.mark_exited();
        info!("Core service shut down");
        Ok(())
    }
}
