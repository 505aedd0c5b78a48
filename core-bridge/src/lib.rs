//! # Core Bridge
//!
//! Asynchronous call bridge and callback channels between the host and the
//! sandboxed SDK module.
//!
//! ## Overview
//!
//! - [`ModuleHandle`] tracks the module lifecycle and resolves readiness once
//!   for every waiter.
//! - [`RpcBridge`] turns named module members into async calls and
//!   normalizes the module's error convention.
//! - [`SdkClient`] is the typed face of the bridge over the closed
//!   [`Operation`] set.
//! - [`ChannelRegistry`] is the capability table the module calls back
//!   through, addressing host callbacks by identifier.
//!
//! ## Usage
//!
//! ```ignore
//! use core_bridge::{ChannelRegistry, ModuleHandle, RpcBridge, SdkClient, PlayRequest};
//! use core_runtime::BridgeConfig;
//! use std::sync::Arc;
//!
//! let config = BridgeConfig::default();
//! let registry = Arc::new(ChannelRegistry::new(config.channel_prefix.clone()));
//! let handle = Arc::new(ModuleHandle::new());
//! handle.spawn_load(loader, registry.clone())?;
//!
//! let client = SdkClient::new(RpcBridge::new(handle, &config));
//! client.play(&PlayRequest::new("alloc", "/movie.mp4")).await?;
//! ```

pub mod bridge;
pub mod channels;
pub mod client;
pub mod error;
pub mod handle;
pub mod operation;

#[cfg(feature = "test-support")]
pub mod testing;

pub use bridge::{CallRequest, RpcBridge};
pub use channels::{
    BatchId, ChannelBatch, ChannelDescriptor, ChannelHandler, ChannelRegistry, ChannelRole,
    ChannelStats,
};
pub use client::{
    DownloadRequest, DownloadResponse, MultiUploadResult, PlayRequest, SdkClient,
    WalletCredentials,
};
pub use error::{CallError, ChannelError, Result, TransitionError};
pub use handle::{ModuleHandle, ModuleState};
pub use operation::{Operation, UnknownOperation};
