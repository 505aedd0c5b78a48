//! # Host Bridge Traits
//!
//! Contracts between the host-side core and its collaborators: the sandboxed
//! SDK module, caller-owned files, the hashing worker, and the presentation
//! pipeline.
//!
//! ## Overview
//!
//! The core never talks to a concrete runtime. Everything it needs from the
//! outside world is expressed as a trait here and injected at construction.
//!
//! ### Module boundary
//! - [`HostValue`](value::HostValue) - Values crossing the boundary
//! - [`ModuleSurface`](module::ModuleSurface) - Named members exposed by the module
//! - [`HostCallDispatch`](module::HostCallDispatch) - Module-to-host callback entry point
//! - [`ModuleLoader`](module::ModuleLoader) - Background module instantiation
//!
//! ### Uploads
//! - [`FileHandle`](file::FileHandle) - Random-access, read-only caller files
//! - [`DigestWorker`](hashing::DigestWorker) - Isolated content hashing
//!
//! ### Playback
//! - [`PresentationElement`](playback::PresentationElement) - Rendering element
//! - [`MediaPipeline`](playback::MediaPipeline) - Media source factory and codec probe
//! - [`Transmuxer`](playback::Transmuxer) - Live segment repackaging
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to the host
//!
//! ## Implementations
//!
//! | Host     | Implementation Crate |
//! |----------|----------------------|
//! | Desktop  | `bridge-desktop`     |
//!
//! ## Error Handling
//!
//! Host capabilities report failures as [`BridgeError`](error::BridgeError).
//! Failures raised by the module itself travel as
//! [`ModuleFault`](module::ModuleFault), which keeps the structured payload.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so implementations can be shared across
//! async tasks behind `Arc`.

pub mod error;
pub mod file;
pub mod hashing;
pub mod logging;
pub mod module;
pub mod playback;
pub mod value;

pub use error::BridgeError;

pub use file::FileHandle;
pub use hashing::{DigestAlgorithm, DigestReceiver, DigestWorker};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use module::{
    HostCallDispatch, Invocation, ModuleFault, ModuleFunction, ModuleLoader, ModuleMember,
    ModuleSurface,
};
pub use playback::{
    MediaPipeline, MediaSource, PlayOutcome, PresentationElement, SourceBuffer,
    TransmuxedSegment, Transmuxer, TransmuxerFactory,
};
pub use value::HostValue;
