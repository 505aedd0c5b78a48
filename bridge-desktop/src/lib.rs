//! # Desktop Bridge Implementations
//!
//! Default implementations of the host seams for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `LocalFile` reads caller files range by range through `tokio::fs`
//! - `MemoryFile` serves uploads from an in-memory buffer
//! - `ThreadDigestWorker` hashes large files on a dedicated OS thread using
//!   `md-5` or `sha2`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalFile, ThreadDigestWorker};
//! use bridge_traits::DigestWorker;
//! use std::sync::Arc;
//!
//! let file = Arc::new(LocalFile::open("/videos/clip.mp4").await?);
//! let digest = ThreadDigestWorker::default().start(file).await??;
//! ```

mod filesystem;
mod hashing;

pub use filesystem::{LocalFile, MemoryFile};
pub use hashing::{digest_hex, ThreadDigestWorker, DEFAULT_READ_CHUNK};
