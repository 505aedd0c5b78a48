//! # Core Upload
//!
//! Multi-file uploads through the module's bulk-upload operation.
//!
//! The module pulls file bytes, reports progress and asks for content digests
//! through callback channels; this crate wires those channels per job and
//! guarantees they are released once the batch settles.
//!
//! ## Usage
//!
//! ```ignore
//! use core_upload::{UploadCoordinator, UploadJob};
//!
//! let coordinator = UploadCoordinator::new(client, registry, digest_worker, &config);
//! let result = coordinator
//!     .submit(vec![UploadJob::new("alloc", "/videos/clip.mp4", file)
//!         .with_progress(Arc::new(|event: ProgressEvent| println!("{:.1}%", event.percent())))])
//!     .await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod job;
pub mod progress;

pub use coordinator::UploadCoordinator;
pub use error::{Result, UploadError};
pub use job::{UploadJob, UploadJobDescriptor, UploadOptions, DEFAULT_NUM_BLOCKS};
pub use progress::{ProgressCallback, ProgressEvent};
