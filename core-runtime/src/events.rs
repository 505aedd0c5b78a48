//! # Event Bus System
//!
//! Broadcasts lifecycle events from the bridge components using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Components publish best-effort events: module state changes, channel
//! allocation and release, upload batch settlement and playback transitions.
//! Publishing never fails the operation that produced the event; with no
//! subscribers the event is simply dropped.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ ModuleHandle ├────────>│          ├────────────>│ Subscriber │
//! ├──────────────┤         │ EventBus │             └────────────┘
//! │ Channels     ├────────>│          │
//! ├──────────────┤         │          │  subscribe  ┌────────────┐
//! │ Upload/Play  ├────────>│          ├────────────>│ Subscriber │
//! └──────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BridgeEvent, EventBus, ModuleEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.publish(BridgeEvent::Module(ModuleEvent::StateChanged {
//!     state: "ready".to_string(),
//! }));
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Module state changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Subscribers that fall behind receive `RecvError::Lagged(n)` and may keep
//! reading; `RecvError::Closed` means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeEvent {
    Module(ModuleEvent),
    Channel(ChannelEvent),
    Upload(UploadEvent),
    Playback(PlaybackEvent),
}

impl BridgeEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            BridgeEvent::Module(e) => e.description(),
            BridgeEvent::Channel(e) => e.description(),
            BridgeEvent::Upload(e) => e.description(),
            BridgeEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            BridgeEvent::Playback(PlaybackEvent::Failed { .. }) => EventSeverity::Error,
            BridgeEvent::Upload(UploadEvent::Settled { success: false, .. }) => {
                EventSeverity::Warning
            }
            BridgeEvent::Playback(PlaybackEvent::SegmentRetry { .. }) => EventSeverity::Warning,
            BridgeEvent::Module(ModuleEvent::StateChanged { state }) if state == "exited" => {
                EventSeverity::Warning
            }
            BridgeEvent::Module(_) | BridgeEvent::Upload(_) => EventSeverity::Info,
            BridgeEvent::Playback(PlaybackEvent::ModeSelected { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Module lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ModuleEvent {
    /// The module handle moved to a new lifecycle state.
    StateChanged { state: String },
}

impl ModuleEvent {
    fn description(&self) -> &str {
        match self {
            ModuleEvent::StateChanged { .. } => "Module state changed",
        }
    }
}

/// Callback channel events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ChannelEvent {
    Allocated {
        channel_id: String,
        role: String,
        batch_id: String,
    },
    Released { channel_id: String },
}

impl ChannelEvent {
    fn description(&self) -> &str {
        match self {
            ChannelEvent::Allocated { .. } => "Channel allocated",
            ChannelEvent::Released { .. } => "Channel released",
        }
    }
}

/// Bulk upload events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// A batch was handed to the module.
    Submitted { batch_id: String, job_count: usize },
    /// The bulk call settled and all channels were released.
    Settled {
        batch_id: String,
        success: bool,
        error: Option<String>,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Submitted { .. } => "Upload batch submitted",
            UploadEvent::Settled { .. } => "Upload batch settled",
        }
    }
}

/// Streaming session events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    ModeSelected { mode: String },
    StateChanged { state: String },
    SegmentAppended { bytes: usize },
    /// A segment fetch failed and will be retried.
    SegmentRetry { attempt: u32, message: String },
    EndOfStream,
    /// The retry budget ran out; the session is terminal.
    Failed { message: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::ModeSelected { .. } => "Playback mode selected",
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::SegmentAppended { .. } => "Segment appended",
            PlaybackEvent::SegmentRetry { .. } => "Segment fetch retry",
            PlaybackEvent::EndOfStream => "End of stream",
            PlaybackEvent::Failed { .. } => "Playback failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for bridge events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: BridgeEvent) -> Result<usize, SendError<BridgeEvent>> {
        self.sender.send(event)
    }

    /// Publishes an event, ignoring the absence of subscribers.
    pub fn publish(&self, event: BridgeEvent) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&BridgeEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<BridgeEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<BridgeEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by [`EventStream::recv`].
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BridgeEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<BridgeEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let event = BridgeEvent::Channel(ChannelEvent::Released {
            channel_id: "__zcn_upload_reader_1".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_publish_does_not() {
        let bus = EventBus::default();
        let event = BridgeEvent::Playback(PlaybackEvent::EndOfStream);
        assert!(bus.emit(event.clone()).is_err());
        bus.publish(event);
    }

    #[tokio::test]
    async fn test_filtered_stream_skips_other_events() {
        let bus = EventBus::new(8);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, BridgeEvent::Upload(_)));

        bus.publish(BridgeEvent::Playback(PlaybackEvent::EndOfStream));
        bus.publish(BridgeEvent::Upload(UploadEvent::Submitted {
            batch_id: "b1".to_string(),
            job_count: 2,
        }));

        let event = stream.recv().await.unwrap();
        assert!(matches!(
            event,
            BridgeEvent::Upload(UploadEvent::Submitted { job_count: 2, .. })
        ));
    }

    #[test]
    fn test_severity() {
        let failed = BridgeEvent::Playback(PlaybackEvent::Failed {
            message: "retry budget exhausted".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let settled = BridgeEvent::Upload(UploadEvent::Settled {
            batch_id: "b".to_string(),
            success: false,
            error: Some("quota".to_string()),
        });
        assert_eq!(settled.severity(), EventSeverity::Warning);

        let appended = BridgeEvent::Playback(PlaybackEvent::SegmentAppended { bytes: 10 });
        assert_eq!(appended.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = BridgeEvent::Module(ModuleEvent::StateChanged {
            state: "ready".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Module");
        assert_eq!(json["payload"]["event"], "StateChanged");
        assert_eq!(json["payload"]["state"], "ready");
    }
}
