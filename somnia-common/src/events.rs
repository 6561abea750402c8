//! Event types for the Somnia event system
//!
//! Provides shared event definitions and the EventBus used by the playback
//! engine and any UI frontends.
//!
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission. All events use one central enum for type safety and
//! exhaustive matching.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback controller state
///
/// The controller is the single writer of this state. `Stopped` is the
/// post-failure resting state ("could not narrate this page"); a user stop
/// lands in `Idle`. Reading may be started from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReaderState {
    /// Nothing in flight; manual navigation available
    Idle,
    /// Narration audio for a page has been requested and not yet arrived
    RequestingNarration { page_index: usize },
    /// Narration for a page is audible
    Playing { page_index: usize },
    /// A page turn animation is in flight
    Transitioning { from_page: usize, to_page: usize },
    /// Reading ended abnormally (narration fetch or device failure)
    Stopped,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderState::Idle => write!(f, "idle"),
            ReaderState::RequestingNarration { page_index } => {
                write!(f, "requesting_narration({})", page_index)
            }
            ReaderState::Playing { page_index } => write!(f, "playing({})", page_index),
            ReaderState::Transitioning { from_page, to_page } => {
                write!(f, "transitioning({}->{})", from_page, to_page)
            }
            ReaderState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Page navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

/// Audio channel identity
///
/// Two independent sinks exist per session: one for synthesized narration,
/// one for the looping ambient soundscape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioChannel {
    Narration,
    Ambience,
}

impl std::fmt::Display for AudioChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioChannel::Narration => write!(f, "narration"),
            AudioChannel::Ambience => write!(f, "ambience"),
        }
    }
}

/// Somnia event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SomniaEvent {
    /// A book was mounted and a reading session created
    ///
    /// Triggers:
    /// - SSE: Render book, enable controls
    SessionMounted {
        session_id: Uuid,
        book_id: Uuid,
        title: String,
        page_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The reading session was torn down
    SessionUnmounted {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Controller state changed
    ///
    /// Triggers:
    /// - SSE: Update reading indicator and controls
    ReaderStateChanged {
        old_state: ReaderState,
        new_state: ReaderState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reading started on a page
    ReadingStarted {
        page_index: usize,
        auto_advance: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reading stopped (user stop, end of book, or unmount)
    ReadingStopped {
        page_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Narration audio for a page became audible
    NarrationStarted {
        page_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Narration could not be fetched or played for a page
    ///
    /// Triggers:
    /// - SSE: Show "could not narrate this page", clear reading indicator
    NarrationFailed {
        page_index: usize,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A page turn animation started
    PageTurnStarted {
        from_page: usize,
        to_page: usize,
        direction: Direction,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current page changed (page turn animation completed)
    ///
    /// Triggers:
    /// - SSE: Render the new page
    PageChanged {
        page_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Channel volume changed
    VolumeChanged {
        channel: AudioChannel,
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Channel mute toggled
    ///
    /// `volume` is the level in effect after the toggle (0.0 when muting,
    /// the restored pre-mute level when unmuting).
    MuteToggled {
        channel: AudioChannel,
        muted: bool,
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A persisted preference changed
    PreferenceChanged {
        key: String,
        value: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SomniaEvent {
    /// Event type name as used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SomniaEvent::SessionMounted { .. } => "SessionMounted",
            SomniaEvent::SessionUnmounted { .. } => "SessionUnmounted",
            SomniaEvent::ReaderStateChanged { .. } => "ReaderStateChanged",
            SomniaEvent::ReadingStarted { .. } => "ReadingStarted",
            SomniaEvent::ReadingStopped { .. } => "ReadingStopped",
            SomniaEvent::NarrationStarted { .. } => "NarrationStarted",
            SomniaEvent::NarrationFailed { .. } => "NarrationFailed",
            SomniaEvent::PageTurnStarted { .. } => "PageTurnStarted",
            SomniaEvent::PageChanged { .. } => "PageChanged",
            SomniaEvent::VolumeChanged { .. } => "VolumeChanged",
            SomniaEvent::MuteToggled { .. } => "MuteToggled",
            SomniaEvent::PreferenceChanged { .. } => "PreferenceChanged",
        }
    }
}

/// Event bus for one-to-many event broadcasting
///
/// Wraps tokio::sync::broadcast. Senders never block; when no receiver is
/// subscribed, events are dropped silently (normal when no UI is attached).
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SomniaEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SomniaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Send errors (no receivers) are ignored.
    pub fn emit(&self, event: SomniaEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_delivery() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(SomniaEvent::PageChanged {
            page_index: 2,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            SomniaEvent::PageChanged { page_index, .. } => assert_eq!(page_index, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(16);
        bus.emit(SomniaEvent::ReadingStopped {
            page_index: 0,
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SomniaEvent::VolumeChanged {
            channel: AudioChannel::Ambience,
            volume: 0.4,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "VolumeChanged");
        assert_eq!(json["channel"], "ambience");
    }
}
