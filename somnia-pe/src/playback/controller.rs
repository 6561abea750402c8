//! Playback controller - the reading session state machine
//!
//! **Responsibilities:**
//! - Owns the `PlaybackSession` state: current page, reading flag,
//!   auto-advance flag, controller state enum
//! - Sequences narration fetch -> narration playback -> (on end) page
//!   transition -> narration fetch for the next page, or stop
//! - Universal cancellation: `stop_reading` is safe from any state,
//!   idempotent, and releases every transient audio resource it owns
//!
//! **Correctness discipline:** all mutation happens behind one async mutex
//! (single writer). Asynchronous completions (narration fetch, device
//! events, transition timers) re-check currency before acting: sequence
//! numbers for narration requests, source generations for device events,
//! an epoch counter for ambience downloads, and the reading flag for
//! everything. A stale completion is discarded with a debug log; that is an
//! expected race outcome, not an error.

use crate::audio::device::{AudioSource, DeviceEvent, DeviceEventKind, PlaybackDevice};
use crate::audio::mixer::VolumeMixer;
use crate::audio::sink::AudioSink;
use crate::db::settings::{PreferenceStore, KEY_AUTO_ADVANCE};
use crate::error::{Error, Result};
use crate::remote::ambience::AmbienceFetcher;
use crate::remote::narration::{NarrationAudio, NarrationBackend, NarrationRequest, NarrationRequester};
use crate::state::SharedState;
use somnia_common::events::{AudioChannel, Direction, ReaderState, SomniaEvent};
use somnia_common::Book;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transition::{PageTransitionCoordinator, TransitionTicket};

/// Per-session controller configuration
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Fixed page turn animation duration
    pub page_turn_duration: Duration,
    /// Language code sent with narration requests
    pub narration_language: String,
    /// Speed multiplier sent with narration requests
    pub narration_speed: f32,
    /// Initial auto-advance flag (read from the preference store at mount)
    pub auto_advance: bool,
}

/// Mutable session state, guarded by the controller mutex
struct ControllerInner {
    state: ReaderState,
    current_page: usize,
    is_reading: bool,
    auto_advance: bool,
    narration: AudioSink,
    ambience: AudioSink,
    mixer: VolumeMixer,
}

impl ControllerInner {
    fn sink_mut(&mut self, channel: AudioChannel) -> &mut AudioSink {
        match channel {
            AudioChannel::Narration => &mut self.narration,
            AudioChannel::Ambience => &mut self.ambience,
        }
    }
}

/// Orchestrates one reading session over a mounted book
///
/// Created at book mount, torn down at unmount. The two audio sinks are
/// exclusively owned here; no other component touches their source or play
/// state.
pub struct PlaybackController {
    session_id: Uuid,
    book: Book,
    inner: Mutex<ControllerInner>,
    requester: NarrationRequester,
    ambience_fetcher: Arc<dyn AmbienceFetcher>,
    transitions: PageTransitionCoordinator,
    prefs: PreferenceStore,
    shared: Arc<SharedState>,
    narration_language: String,
    narration_speed: f32,
    /// Epoch for ambience downloads; a completed download only plays if the
    /// epoch is unchanged since it started
    ambience_epoch: AtomicU64,
    self_ref: OnceLock<Weak<PlaybackController>>,
}

impl PlaybackController {
    /// Create the controller and start its device event loop.
    ///
    /// `device_events` is the receiving end of the channel both playback
    /// devices report into.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        session_id: Uuid,
        book: Book,
        narration_device: Arc<dyn PlaybackDevice>,
        ambience_device: Arc<dyn PlaybackDevice>,
        device_events: mpsc::UnboundedReceiver<DeviceEvent>,
        narration_backend: Arc<dyn NarrationBackend>,
        ambience_fetcher: Arc<dyn AmbienceFetcher>,
        prefs: PreferenceStore,
        shared: Arc<SharedState>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let mixer = VolumeMixer::new();
        let mut narration = AudioSink::new(AudioChannel::Narration, narration_device);
        let mut ambience = AudioSink::new(AudioChannel::Ambience, ambience_device);
        narration.set_volume(mixer.volume(AudioChannel::Narration));
        ambience.set_volume(mixer.volume(AudioChannel::Ambience));

        let controller = Arc::new(Self {
            session_id,
            book,
            inner: Mutex::new(ControllerInner {
                state: ReaderState::Idle,
                current_page: 0,
                is_reading: false,
                auto_advance: options.auto_advance,
                narration,
                ambience,
                mixer,
            }),
            requester: NarrationRequester::new(narration_backend),
            ambience_fetcher,
            transitions: PageTransitionCoordinator::new(options.page_turn_duration),
            prefs,
            shared,
            narration_language: options.narration_language,
            narration_speed: options.narration_speed,
            ambience_epoch: AtomicU64::new(0),
            self_ref: OnceLock::new(),
        });

        let _ = controller.self_ref.set(Arc::downgrade(&controller));
        tokio::spawn(device_event_loop(
            Arc::downgrade(&controller),
            device_events,
        ));

        info!(
            "Reading session {} created ({} pages)",
            session_id,
            controller.book.page_count()
        );
        controller
    }

    // ========================================================================
    // Public operations (driven by user input)
    // ========================================================================

    /// Start reading a page aloud.
    ///
    /// Valid from `Idle` and `Stopped`. Starting the page already being read
    /// is a no-op; starting a different page while reading stops the old
    /// narration first. The page's ambient sound (if any) starts in
    /// parallel, off the narration critical path.
    pub async fn start_reading(&self, page_index: usize, auto_advance: bool) -> Result<()> {
        if page_index >= self.book.page_count() {
            return Err(Error::PageOutOfRange {
                index: page_index,
                page_count: self.book.page_count(),
            });
        }

        let mut inner = self.inner.lock().await;

        if matches!(inner.state, ReaderState::Transitioning { .. }) {
            return Err(Error::InvalidState(
                "cannot start reading during a page turn".to_string(),
            ));
        }

        if inner.is_reading {
            match inner.state {
                ReaderState::Playing { page_index: p }
                | ReaderState::RequestingNarration { page_index: p }
                    if p == page_index =>
                {
                    debug!("already reading page {}; ignoring", page_index);
                    return Ok(());
                }
                _ => {
                    // Different page: the old narration stops before the new
                    // one is requested.
                    self.halt_playback(&mut inner);
                }
            }
        }

        self.apply_auto_advance(&mut inner, auto_advance).await;

        inner.is_reading = true;
        if inner.current_page != page_index {
            inner.current_page = page_index;
            self.shared.set_current_page(page_index).await;
            self.shared.broadcast_event(SomniaEvent::PageChanged {
                page_index,
                timestamp: chrono::Utc::now(),
            });
        }

        info!(
            "Start reading page {} (auto_advance={})",
            page_index, auto_advance
        );
        self.shared.broadcast_event(SomniaEvent::ReadingStarted {
            page_index,
            auto_advance,
            timestamp: chrono::Utc::now(),
        });

        self.begin_page(&mut inner, page_index).await
    }

    /// Stop reading.
    ///
    /// The universal cancellation operation: valid from any state,
    /// idempotent. Pauses both sinks, rewinds them, releases their sources,
    /// marks any in-flight narration request stale, and lands in `Idle`.
    pub async fn stop_reading(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    /// Navigate to an adjacent page.
    ///
    /// Returns `Ok(None)` when the request is a no-op: at a book edge, or
    /// while a transition is already in flight (rapid double-input).
    /// If reading is active, narration is cancelled synchronously before
    /// the transition starts so audio never plays against the wrong page.
    pub async fn manual_navigate(&self, direction: Direction) -> Result<Option<usize>> {
        let mut inner = self.inner.lock().await;

        let target = match direction {
            Direction::Next if inner.current_page + 1 < self.book.page_count() => {
                inner.current_page + 1
            }
            Direction::Prev if inner.current_page > 0 => inner.current_page - 1,
            _ => {
                debug!("navigation past book edge ignored");
                return Ok(None);
            }
        };

        let ticket = match self.transitions.try_begin(direction) {
            Ok(ticket) => ticket,
            Err(Error::TransitionBusy) => {
                debug!("page turn already in flight; navigation ignored");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if inner.is_reading {
            self.stop_locked(&mut inner).await;
        }

        let from_page = inner.current_page;
        self.transition_state(
            &mut inner,
            ReaderState::Transitioning {
                from_page,
                to_page: target,
            },
        )
        .await;
        self.shared.broadcast_event(SomniaEvent::PageTurnStarted {
            from_page,
            to_page: target,
            direction,
            timestamp: chrono::Utc::now(),
        });
        drop(inner);

        if let Some(this) = self.handle() {
            tokio::spawn(async move {
                this.finish_transition(ticket, target, false).await;
            });
        }
        Ok(Some(target))
    }

    /// Change the auto-advance flag; persisted on change
    pub async fn set_auto_advance(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        self.apply_auto_advance(&mut inner, enabled).await;
    }

    /// Set a channel's volume
    pub async fn set_channel_volume(&self, channel: AudioChannel, volume: f32) {
        let mut inner = self.inner.lock().await;
        let applied = inner.mixer.set_volume(channel, volume);
        inner.sink_mut(channel).set_volume(applied);
        self.shared
            .set_channel_volume(channel, applied, false)
            .await;
        self.shared.broadcast_event(SomniaEvent::VolumeChanged {
            channel,
            volume: applied,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Toggle a channel's mute; the pre-mute level is restored exactly
    pub async fn toggle_mute(&self, channel: AudioChannel) -> f32 {
        let mut inner = self.inner.lock().await;
        let applied = inner.mixer.toggle_mute(channel);
        let muted = inner.mixer.is_muted(channel);
        inner.sink_mut(channel).set_volume(applied);
        self.shared
            .set_channel_volume(channel, applied, muted)
            .await;
        self.shared.broadcast_event(SomniaEvent::MuteToggled {
            channel,
            muted,
            volume: applied,
            timestamp: chrono::Utc::now(),
        });
        applied
    }

    /// Tear the session down: stop everything, release all resources
    pub async fn shutdown(&self) {
        info!("Reading session {} shutting down", self.session_id);
        self.stop_reading().await;
    }

    // ========================================================================
    // Internal callbacks (resumption points)
    // ========================================================================

    /// Narration fetch completed (possibly long after it was superseded)
    async fn on_narration_ready(
        &self,
        page_index: usize,
        seq: u64,
        result: Result<NarrationAudio>,
    ) {
        let mut inner = self.inner.lock().await;

        let expected = matches!(
            inner.state,
            ReaderState::RequestingNarration { page_index: p } if p == page_index
        );
        if !self.requester.is_current(seq) || !inner.is_reading || !expected {
            // Expected race outcome: superseded or reading stopped while the
            // fetch was in flight. The payload is dropped unplayed.
            debug!(
                "discarding stale narration result for page {} (seq {})",
                page_index, seq
            );
            return;
        }

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                self.fail_locked(&mut inner, page_index, &e.to_string()).await;
                return;
            }
        };

        let volume = inner.mixer.volume(AudioChannel::Narration);
        let source = AudioSource {
            bytes: audio.bytes,
            playback_rate: audio.playback_rate,
            looping: false,
        };
        if let Err(e) = inner.narration.set_source(source) {
            self.fail_locked(&mut inner, page_index, &e.to_string()).await;
            return;
        }
        inner.narration.set_volume(volume);
        if let Err(e) = inner.narration.play() {
            // Device rejection recovers exactly like a fetch failure.
            self.fail_locked(&mut inner, page_index, &e.to_string()).await;
            return;
        }

        self.transition_state(&mut inner, ReaderState::Playing { page_index })
            .await;
        self.shared.broadcast_event(SomniaEvent::NarrationStarted {
            page_index,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Narration playback reached the end of its source
    async fn on_narration_ended(&self, generation: u64) {
        let mut inner = self.inner.lock().await;

        if generation != inner.narration.generation() {
            debug!("stale narration ended event (generation {})", generation);
            return;
        }
        let page_index = match inner.state {
            ReaderState::Playing { page_index } => page_index,
            _ => {
                debug!("narration ended outside Playing; ignoring");
                return;
            }
        };
        inner.narration.mark_ended();

        if inner.auto_advance && page_index + 1 < self.book.page_count() {
            // Release the finished page's narration resource; reading
            // continues through the page turn.
            inner.narration.clear_source();

            let to_page = page_index + 1;
            let ticket = match self.transitions.try_begin(Direction::Next) {
                Ok(ticket) => ticket,
                Err(_) => {
                    // Only this state machine starts transitions, so the slot
                    // should always be free here.
                    warn!("transition slot busy at auto-advance; stopping");
                    self.stop_locked(&mut inner).await;
                    return;
                }
            };

            self.transition_state(
                &mut inner,
                ReaderState::Transitioning {
                    from_page: page_index,
                    to_page,
                },
            )
            .await;
            self.shared.broadcast_event(SomniaEvent::PageTurnStarted {
                from_page: page_index,
                to_page,
                direction: Direction::Next,
                timestamp: chrono::Utc::now(),
            });
            drop(inner);

            if let Some(this) = self.handle() {
                tokio::spawn(async move {
                    this.finish_transition(ticket, to_page, true).await;
                });
            }
        } else {
            // Auto-advance off, or the book is finished: reaching the last
            // page stops reading rather than advancing out of range.
            info!("narration ended on page {}; stopping", page_index);
            self.stop_locked(&mut inner).await;
        }
    }

    /// A page turn animation finished
    async fn finish_transition(&self, ticket: TransitionTicket, to_page: usize, resume: bool) {
        ticket.run().await;

        let mut inner = self.inner.lock().await;
        inner.current_page = to_page;
        self.shared.set_current_page(to_page).await;
        self.shared.broadcast_event(SomniaEvent::PageChanged {
            page_index: to_page,
            timestamp: chrono::Utc::now(),
        });

        if resume && inner.is_reading {
            // Auto-advance: narration for the new page may start only now
            // that the transition into it has completed.
            if let Err(e) = self.begin_page(&mut inner, to_page).await {
                self.fail_locked(&mut inner, to_page, &e.to_string()).await;
            }
        } else if matches!(inner.state, ReaderState::Transitioning { .. }) {
            // Manual navigation, or a stop/failure arrived mid-turn.
            self.transition_state(&mut inner, ReaderState::Idle).await;
        }
    }

    /// Ambient sound download completed
    async fn on_ambience_ready(&self, epoch: u64, page_index: usize, bytes: Vec<u8>) {
        let mut inner = self.inner.lock().await;

        if self.ambience_epoch.load(Ordering::SeqCst) != epoch || !inner.is_reading {
            debug!("discarding stale ambient payload for page {}", page_index);
            return;
        }

        let volume = inner.mixer.volume(AudioChannel::Ambience);
        let source = AudioSource {
            bytes,
            playback_rate: 1.0,
            looping: true,
        };
        match inner.ambience.set_source(source) {
            Ok(_) => {
                inner.ambience.set_volume(volume);
                if let Err(e) = inner.ambience.play() {
                    warn!("ambience playback refused for page {}: {}", page_index, e);
                    inner.ambience.clear_source();
                }
            }
            Err(e) => warn!("ambience source rejected for page {}: {}", page_index, e),
        }
    }

    async fn handle_device_event(&self, event: DeviceEvent) {
        match event.kind {
            DeviceEventKind::Ended => match event.channel {
                AudioChannel::Narration => self.on_narration_ended(event.generation).await,
                // Ambience loops; a natural end never fires for it.
                AudioChannel::Ambience => {}
            },
            DeviceEventKind::Failed(reason) => {
                self.on_device_failed(event.channel, event.generation, reason)
                    .await
            }
        }
    }

    async fn on_device_failed(&self, channel: AudioChannel, generation: u64, reason: String) {
        let mut inner = self.inner.lock().await;
        match channel {
            AudioChannel::Narration => {
                if generation != inner.narration.generation() {
                    debug!("stale narration device failure ignored: {}", reason);
                    return;
                }
                let page_index = inner.current_page;
                self.fail_locked(&mut inner, page_index, &reason).await;
            }
            AudioChannel::Ambience => {
                if generation != inner.ambience.generation() {
                    return;
                }
                // Ambience is best-effort; narration is unaffected.
                warn!("ambience device failure: {}", reason);
                inner.ambience.clear_source();
            }
        }
    }

    // ========================================================================
    // Locked helpers
    // ========================================================================

    /// Enter `RequestingNarration` for a page: kick off the narration fetch
    /// and the page's ambient sound, both as spawned tasks
    async fn begin_page(&self, inner: &mut ControllerInner, page_index: usize) -> Result<()> {
        let page = match self.book.page(page_index) {
            Some(page) => page.clone(),
            None => {
                return Err(Error::PageOutOfRange {
                    index: page_index,
                    page_count: self.book.page_count(),
                })
            }
        };

        self.transition_state(&mut *inner, ReaderState::RequestingNarration { page_index })
            .await;

        // Ambient channel: fire-and-forget, never on the narration critical
        // path. A page without a sound URL silences the channel.
        let epoch = self.ambience_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        match page.ambient_sound_url {
            None => inner.ambience.clear_source(),
            Some(url) => {
                if let Some(this) = self.handle() {
                    tokio::spawn(async move {
                        match this.ambience_fetcher.fetch(&url).await {
                            Ok(bytes) => this.on_ambience_ready(epoch, page_index, bytes).await,
                            Err(e) => {
                                warn!("ambient sound for page {} unavailable: {}", page_index, e)
                            }
                        }
                    });
                }
            }
        }

        let seq = self.requester.begin();
        let request = NarrationRequest {
            text: page.text,
            language: self.narration_language.clone(),
            speed: self.narration_speed,
        };
        if let Some(this) = self.handle() {
            tokio::spawn(async move {
                let result = this.requester.fetch(request).await;
                this.on_narration_ready(page_index, seq, result).await;
            });
        }
        Ok(())
    }

    /// The resource-release core shared by stop and page changes: pause and
    /// rewind both sinks, release their sources, and mark every outstanding
    /// asynchronous completion stale. Does not touch `is_reading`.
    fn halt_playback(&self, inner: &mut ControllerInner) {
        self.requester.invalidate();
        self.ambience_epoch.fetch_add(1, Ordering::SeqCst);

        inner.narration.pause();
        inner.narration.reset_to_start();
        inner.narration.clear_source();

        inner.ambience.pause();
        inner.ambience.reset_to_start();
        inner.ambience.clear_source();
    }

    /// Full stop: release everything and land in `Idle`. Idempotent.
    async fn stop_locked(&self, inner: &mut ControllerInner) {
        let was_reading = inner.is_reading;
        self.halt_playback(inner);
        inner.is_reading = false;
        self.transition_state(inner, ReaderState::Idle).await;

        if was_reading {
            self.shared.broadcast_event(SomniaEvent::ReadingStopped {
                page_index: inner.current_page,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Collaborator or device failure: release everything and land in
    /// `Stopped`, the user-visible "could not narrate this page" state.
    /// The book stays manually navigable.
    async fn fail_locked(&self, inner: &mut ControllerInner, page_index: usize, reason: &str) {
        warn!("narration failed on page {}: {}", page_index, reason);
        self.halt_playback(inner);
        inner.is_reading = false;
        self.transition_state(inner, ReaderState::Stopped).await;
        self.shared.broadcast_event(SomniaEvent::NarrationFailed {
            page_index,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    async fn apply_auto_advance(&self, inner: &mut ControllerInner, enabled: bool) {
        if inner.auto_advance == enabled {
            return;
        }
        inner.auto_advance = enabled;
        self.shared.set_auto_advance(enabled).await;
        if let Err(e) = self.prefs.set_auto_advance_enabled(enabled).await {
            warn!("failed to persist auto-advance preference: {}", e);
        }
        self.shared.broadcast_event(SomniaEvent::PreferenceChanged {
            key: KEY_AUTO_ADVANCE.to_string(),
            value: enabled,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Move the state machine and publish the change
    async fn transition_state(&self, inner: &mut ControllerInner, new_state: ReaderState) {
        let old_state = inner.state;
        inner.state = new_state;
        self.shared.set_reader_state(new_state, inner.is_reading).await;
        if old_state != new_state {
            debug!("reader state {} -> {}", old_state, new_state);
            self.shared.broadcast_event(SomniaEvent::ReaderStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn handle(&self) -> Option<Arc<Self>> {
        self.self_ref.get().and_then(Weak::upgrade)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub async fn reader_state(&self) -> ReaderState {
        self.inner.lock().await.state
    }

    pub async fn current_page(&self) -> usize {
        self.inner.lock().await.current_page
    }

    pub async fn is_reading(&self) -> bool {
        self.inner.lock().await.is_reading
    }

    pub async fn auto_advance(&self) -> bool {
        self.inner.lock().await.auto_advance
    }

    pub async fn channel_volume(&self, channel: AudioChannel) -> f32 {
        self.inner.lock().await.mixer.volume(channel)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitions.is_in_flight()
    }
}

/// Forwards device events into the controller until the channel closes or
/// the controller is dropped
async fn device_event_loop(
    weak: Weak<PlaybackController>,
    mut events: mpsc::UnboundedReceiver<DeviceEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(controller) = weak.upgrade() else {
            break;
        };
        controller.handle_device_event(event).await;
    }
    debug!("device event loop ended");
}
