//! Workspace umbrella crate.
//!
//! Exposes feature flags that map onto the individual workspace crates
//! (`core-service`, `core-upload`, `core-playback`). Hosts can depend on
//! `zcn-host-workspace` and enable the documented features instead of wiring
//! each crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;

#[cfg(feature = "upload")]
pub use core_upload as upload;

#[cfg(feature = "playback")]
pub use core_playback as playback;
