//! # Core Playback
//!
//! Segment-by-segment streaming from the module into a presentation
//! pipeline.
//!
//! ## Overview
//!
//! - [`StreamingPlayer`] selects between downloading, chunked streaming and
//!   live streaming, then keeps the source buffer fed
//! - [`ContainerProbe`] decides whether a first segment can be appended as-is
//! - [`PlayerConfig`] bounds segment retries with exponential backoff; a
//!   session that runs out of budget ends in [`PlaybackState::Failed`]
//!
//! Hosts supply the element, media pipeline and transmuxer through the
//! `bridge_traits::playback` seams.

pub mod config;
pub mod error;
pub mod player;
pub mod probe;
mod pump;
pub mod session;

pub use config::{PlayerConfig, RetryPolicy, DEFAULT_LIVE_MIME_CODECS};
pub use error::{PlaybackError, Result};
pub use player::{PlaybackRequest, StreamingPlayer};
pub use probe::{ContainerInfo, ContainerProbe, DefaultContainerProbe};
pub use session::{PlaybackMode, PlaybackSession, PlaybackState, SessionStats};
