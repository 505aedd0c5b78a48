//! # Playback Session
//!
//! Shared state of one streaming session: lifecycle, selected mode, the
//! bound blob URL and the outstanding-fetch gauge.

use core_runtime::events::{BridgeEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

// ============================================================================
// Mode and state
// ============================================================================

/// How segments reach the presentation element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// The element plays a fully materialized resource URL.
    Downloading,
    /// Fragmented segments are appended to a media source as fetched.
    ChunkStreaming,
    /// Unbounded segments are transmuxed, then appended.
    LiveStreaming,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::Downloading => "downloading",
            PlaybackMode::ChunkStreaming => "chunk_streaming",
            PlaybackMode::LiveStreaming => "live_streaming",
        }
    }

    /// Whether this mode runs the segment pump.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, PlaybackMode::Downloading)
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Starting,
    Active,
    Stopped,
    /// Terminal: the retry budget ran out or the format was unplayable.
    Failed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Starting => "starting",
            PlaybackState::Active => "active",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Failed)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters collected over the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub segments_fetched: u64,
    pub segments_appended: u64,
    pub bytes_appended: u64,
    pub retries: u64,
    pub empty_polls: u64,
    /// Highest number of segment fetches ever in flight at once.
    pub max_outstanding_fetches: usize,
}

// ============================================================================
// Session
// ============================================================================

/// State shared between the player and its pump task.
pub struct PlaybackSession {
    state: watch::Sender<PlaybackState>,
    mode: Mutex<Option<PlaybackMode>>,
    bound_url: Mutex<Option<String>>,
    outstanding_fetches: AtomicUsize,
    stats: Mutex<SessionStats>,
    events: Option<EventBus>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            state,
            mode: Mutex::new(None),
            bound_url: Mutex::new(None),
            outstanding_fetches: AtomicUsize::new(0),
            stats: Mutex::new(SessionStats::default()),
            events: None,
        }
    }

    /// Creates a session that publishes its transitions on `events`.
    pub fn with_events(events: EventBus) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    pub(crate) fn publish(&self, event: PlaybackEvent) {
        if let Some(events) = &self.events {
            events.publish(BridgeEvent::Playback(event));
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    /// Stores `next`, returning the previous state.
    pub(crate) fn set_state(&self, next: PlaybackState) -> PlaybackState {
        let previous = self.state.send_replace(next);
        if previous != next {
            self.publish_state(next);
        }
        previous
    }

    fn publish_state(&self, state: PlaybackState) {
        self.publish(PlaybackEvent::StateChanged {
            state: state.as_str().to_string(),
        });
    }

    /// Moves `from -> to` atomically; returns the actual state on mismatch.
    pub(crate) fn transition(
        &self,
        from: PlaybackState,
        to: PlaybackState,
    ) -> std::result::Result<(), PlaybackState> {
        let mut observed = from;
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                observed = *state;
                false
            }
        });
        if moved {
            self.publish_state(to);
            Ok(())
        } else {
            Err(observed)
        }
    }

    /// Moves any non-terminal state to `Failed`.
    ///
    /// Returns `false` when the session had already stopped or failed.
    pub(crate) fn fail(&self, message: impl Into<String>) -> bool {
        let failed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = PlaybackState::Failed;
                true
            }
        });
        if failed {
            self.publish_state(PlaybackState::Failed);
            self.publish(PlaybackEvent::Failed {
                message: message.into(),
            });
        }
        failed
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        *self.mode.lock()
    }

    pub(crate) fn set_mode(&self, mode: PlaybackMode) {
        *self.mode.lock() = Some(mode);
        self.publish(PlaybackEvent::ModeSelected {
            mode: mode.as_str().to_string(),
        });
    }

    /// The blob URL currently bound to the element, if not yet revoked.
    pub fn bound_url(&self) -> Option<String> {
        self.bound_url.lock().clone()
    }

    pub(crate) fn bind_url(&self, url: impl Into<String>) {
        *self.bound_url.lock() = Some(url.into());
    }

    /// Empties the bound-URL slot. Only the first caller gets the URL.
    pub(crate) fn take_bound_url(&self) -> Option<String> {
        self.bound_url.lock().take()
    }

    /// Whether a segment fetch is in flight.
    pub fn pending_fetch(&self) -> bool {
        self.outstanding_fetches.load(Ordering::Acquire) > 0
    }

    /// Marks a fetch as outstanding until the guard drops.
    pub(crate) fn begin_fetch(&self) -> FetchGuard<'_> {
        let outstanding = self.outstanding_fetches.fetch_add(1, Ordering::AcqRel) + 1;
        let mut stats = self.stats.lock();
        stats.segments_fetched += 1;
        stats.max_outstanding_fetches = stats.max_outstanding_fetches.max(outstanding);
        FetchGuard { session: self }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    pub(crate) fn record_append(&self, bytes: usize) {
        let mut stats = self.stats.lock();
        stats.segments_appended += 1;
        stats.bytes_appended += bytes as u64;
    }

    pub(crate) fn record_retry(&self) {
        self.stats.lock().retries += 1;
    }

    pub(crate) fn record_empty_poll(&self) {
        self.stats.lock().empty_polls += 1;
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("pending_fetch", &self.pending_fetch())
            .finish()
    }
}

/// Outstanding-fetch marker; decrements the gauge on drop.
pub(crate) struct FetchGuard<'a> {
    session: &'a PlaybackSession,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.session
            .outstanding_fetches
            .fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_checks_current_state() {
        let session = PlaybackSession::new();
        assert!(session
            .transition(PlaybackState::Idle, PlaybackState::Starting)
            .is_ok());
        assert_eq!(
            session.transition(PlaybackState::Idle, PlaybackState::Starting),
            Err(PlaybackState::Starting)
        );
        assert_eq!(session.state(), PlaybackState::Starting);
    }

    #[test]
    fn test_bound_url_taken_once() {
        let session = PlaybackSession::new();
        session.bind_url("blob:1");
        assert_eq!(session.take_bound_url().as_deref(), Some("blob:1"));
        assert_eq!(session.take_bound_url(), None);
    }

    #[test]
    fn test_fetch_guard_tracks_gauge() {
        let session = PlaybackSession::new();
        {
            let _guard = session.begin_fetch();
            assert!(session.pending_fetch());
        }
        assert!(!session.pending_fetch());
        let _a = session.begin_fetch();
        let stats = session.stats();
        assert_eq!(stats.segments_fetched, 2);
        assert_eq!(stats.max_outstanding_fetches, 1);
    }

    #[test]
    fn test_fail_is_terminal_and_published() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let session = PlaybackSession::with_events(events);

        session.set_state(PlaybackState::Active);
        assert!(session.fail("gave up"));
        assert!(!session.fail("again"));
        assert_eq!(session.state(), PlaybackState::Failed);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        assert!(matches!(
            seen.last(),
            Some(BridgeEvent::Playback(PlaybackEvent::Failed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_state_subscribers_see_changes() {
        let session = PlaybackSession::new();
        let mut rx = session.subscribe();
        session.set_state(PlaybackState::Active);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PlaybackState::Active);
    }
}
