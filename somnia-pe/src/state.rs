//! Shared playback state
//!
//! Thread-safe snapshot of the reading session for API handlers and SSE
//! clients. The playback controller is the sole writer; everything else
//! reads. Uses RwLock for concurrent read access with rare writes.

use serde::Serialize;
use somnia_common::events::{AudioChannel, EventBus, ReaderState, SomniaEvent};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Snapshot of the current reading session, as served by the API
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    /// Mounted session id (None when no book is mounted)
    pub session_id: Option<Uuid>,
    /// Mounted book id
    pub book_id: Option<Uuid>,
    /// Mounted book title
    pub title: Option<String>,
    /// Page count of the mounted book
    pub page_count: usize,
    /// Controller state
    pub state: ReaderState,
    /// Currently visible page index
    pub current_page: usize,
    /// Reading is active (narration requested, audible, or auto-advancing)
    pub is_reading: bool,
    /// Auto-advance to the next page when narration ends
    pub auto_advance: bool,
    /// A page turn animation is in flight
    pub is_transitioning: bool,
    /// Narration channel level
    pub narration_volume: f32,
    /// Ambience channel level
    pub ambience_volume: f32,
    pub narration_muted: bool,
    pub ambience_muted: bool,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            book_id: None,
            title: None,
            page_count: 0,
            state: ReaderState::Idle,
            current_page: 0,
            is_reading: false,
            auto_advance: false,
            is_transitioning: false,
            narration_volume: 1.0,
            ambience_volume: 0.5,
            narration_muted: false,
            ambience_muted: false,
        }
    }
}

/// Shared state accessible by all components
pub struct SharedState {
    snapshot: RwLock<PlaybackSnapshot>,
    events: EventBus,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::default()),
            events: EventBus::new(100),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: SomniaEvent) {
        self.events.emit(event);
    }

    /// Subscribe to the event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<SomniaEvent> {
        self.events.subscribe()
    }

    /// Current session snapshot
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Install the snapshot for a newly mounted session
    pub async fn session_mounted(
        &self,
        session_id: Uuid,
        book_id: Uuid,
        title: String,
        page_count: usize,
        auto_advance: bool,
    ) {
        let mut snap = self.snapshot.write().await;
        *snap = PlaybackSnapshot {
            session_id: Some(session_id),
            book_id: Some(book_id),
            title: Some(title),
            page_count,
            auto_advance,
            ..PlaybackSnapshot::default()
        };
    }

    /// Clear the snapshot after unmount
    pub async fn session_unmounted(&self) {
        *self.snapshot.write().await = PlaybackSnapshot::default();
    }

    pub async fn set_reader_state(&self, state: ReaderState, is_reading: bool) {
        let mut snap = self.snapshot.write().await;
        snap.state = state;
        snap.is_reading = is_reading;
        snap.is_transitioning = matches!(state, ReaderState::Transitioning { .. });
    }

    pub async fn set_current_page(&self, page_index: usize) {
        self.snapshot.write().await.current_page = page_index;
    }

    pub async fn set_auto_advance(&self, enabled: bool) {
        self.snapshot.write().await.auto_advance = enabled;
    }

    pub async fn set_channel_volume(&self, channel: AudioChannel, volume: f32, muted: bool) {
        let mut snap = self.snapshot.write().await;
        match channel {
            AudioChannel::Narration => {
                snap.narration_volume = volume;
                snap.narration_muted = muted;
            }
            AudioChannel::Ambience => {
                snap.ambience_volume = volume;
                snap.ambience_muted = muted;
            }
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mount_and_unmount_reset_snapshot() {
        let state = SharedState::new();
        assert!(state.snapshot().await.session_id.is_none());

        let session_id = Uuid::new_v4();
        state
            .session_mounted(session_id, Uuid::new_v4(), "Night Garden".to_string(), 5, true)
            .await;

        let snap = state.snapshot().await;
        assert_eq!(snap.session_id, Some(session_id));
        assert_eq!(snap.page_count, 5);
        assert!(snap.auto_advance);
        assert_eq!(snap.state, ReaderState::Idle);

        state.session_unmounted().await;
        assert!(state.snapshot().await.session_id.is_none());
    }

    #[tokio::test]
    async fn test_reader_state_updates_transition_flag() {
        let state = SharedState::new();

        state
            .set_reader_state(
                ReaderState::Transitioning {
                    from_page: 0,
                    to_page: 1,
                },
                true,
            )
            .await;
        let snap = state.snapshot().await;
        assert!(snap.is_transitioning);
        assert!(snap.is_reading);

        state.set_reader_state(ReaderState::Idle, false).await;
        assert!(!state.snapshot().await.is_transitioning);
    }
}
