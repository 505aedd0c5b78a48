//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the bridge, upload and
//! playback crates:
//! - Logging and tracing infrastructure
//! - Bridge configuration
//! - Event bus system
//!
//! ## Overview
//!
//! This crate carries no module-specific behavior. It fixes the logging
//! conventions, the validated configuration every component is built from,
//! and the broadcast channel components use to report lifecycle changes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use error::{Error, Result};
pub use events::{BridgeEvent, EventBus};
