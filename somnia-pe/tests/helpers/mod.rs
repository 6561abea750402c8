//! Test harness for PlaybackController integration tests
//!
//! Provides deterministic substitutes for the engine's collaborators:
//! - MockDevice: records every playback device command and lets tests emit
//!   ended/failure events
//! - MockNarrationBackend: optionally gated synthesis with request capture
//! - MockAmbienceFetcher: canned ambient payloads with URL capture
//! plus an in-memory preferences database.

use async_trait::async_trait;
use somnia_common::events::{AudioChannel, ReaderState};
use somnia_common::{Book, Page};
use somnia_pe::audio::device::{
    AudioSource, DeviceEvent, DeviceEventKind, DeviceFactory, PlaybackDevice,
};
use somnia_pe::db;
use somnia_pe::db::settings::PreferenceStore;
use somnia_pe::error::{Error, Result};
use somnia_pe::playback::{ControllerOptions, PlaybackController};
use somnia_pe::remote::ambience::AmbienceFetcher;
use somnia_pe::remote::narration::{NarrationAudio, NarrationBackend, NarrationRequest};
use somnia_pe::state::SharedState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

// ================================================================================
// MockDevice
// ================================================================================

/// Recorded playback device command
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetSource { looping: bool, generation: u64 },
    ClearSource,
    Play,
    Pause,
    ResetToStart,
    SetVolume(f32),
}

#[derive(Default)]
struct MockDeviceState {
    calls: Vec<DeviceCall>,
    has_source: bool,
    playing: bool,
    volume: f32,
    generation: u64,
}

/// Playback device double that records commands and emits events on demand
pub struct MockDevice {
    channel: AudioChannel,
    events: mpsc::UnboundedSender<DeviceEvent>,
    state: Mutex<MockDeviceState>,
    fail_play: AtomicBool,
}

impl MockDevice {
    pub fn new(channel: AudioChannel, events: mpsc::UnboundedSender<DeviceEvent>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            events,
            state: Mutex::new(MockDeviceState::default()),
            fail_play: AtomicBool::new(false),
        })
    }

    /// Make subsequent play() calls fail (autoplay policy / decode error)
    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    /// Emit an Ended event for the current source
    pub fn emit_ended(&self) {
        let generation = self.state.lock().unwrap().generation;
        let _ = self.events.send(DeviceEvent {
            channel: self.channel,
            generation,
            kind: DeviceEventKind::Ended,
        });
    }

    /// Emit a failure event for the current source
    pub fn emit_failure(&self, reason: &str) {
        let generation = self.state.lock().unwrap().generation;
        let _ = self.events.send(DeviceEvent {
            channel: self.channel,
            generation,
            kind: DeviceEventKind::Failed(reason.to_string()),
        });
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_source_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::SetSource { .. }))
            .count()
    }

    pub fn has_source(&self) -> bool {
        self.state.lock().unwrap().has_source
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }
}

impl PlaybackDevice for MockDevice {
    fn set_source(&self, source: AudioSource, generation: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::SetSource {
            looping: source.looping,
            generation,
        });
        state.has_source = true;
        state.playing = false;
        state.generation = generation;
        Ok(())
    }

    fn clear_source(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::ClearSource);
        state.has_source = false;
        state.playing = false;
    }

    fn play(&self) -> Result<()> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::PlaybackDevice("mock play refused".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::Play);
        state.playing = true;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::Pause);
        state.playing = false;
    }

    fn reset_to_start(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::ResetToStart);
        state.playing = false;
    }

    fn set_volume(&self, volume: f32) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::SetVolume(volume));
        state.volume = volume;
    }
}

/// Factory handing out MockDevices and remembering them per channel
pub struct MockDeviceFactory {
    created: Mutex<HashMap<AudioChannel, Arc<MockDevice>>>,
}

impl MockDeviceFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(HashMap::new()),
        })
    }

    pub fn device(&self, channel: AudioChannel) -> Option<Arc<MockDevice>> {
        self.created.lock().unwrap().get(&channel).cloned()
    }
}

impl DeviceFactory for MockDeviceFactory {
    fn create(
        &self,
        channel: AudioChannel,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<Arc<dyn PlaybackDevice>> {
        let device = MockDevice::new(channel, events);
        self.created.lock().unwrap().insert(channel, device.clone());
        Ok(device)
    }
}

// ================================================================================
// MockNarrationBackend
// ================================================================================

/// Narration synthesis double
///
/// Ungated, `synthesize` resolves immediately; gated, it parks until the
/// test calls `release`, which models a slow collaborator.
pub struct MockNarrationBackend {
    requests: Mutex<Vec<NarrationRequest>>,
    gate: tokio::sync::Semaphore,
    gated: bool,
    fail: AtomicBool,
}

impl MockNarrationBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            gate: tokio::sync::Semaphore::new(0),
            gated: false,
            fail: AtomicBool::new(false),
        })
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            gate: tokio::sync::Semaphore::new(0),
            gated: true,
            fail: AtomicBool::new(false),
        })
    }

    /// Let one parked synthesize call complete
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<NarrationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NarrationBackend for MockNarrationBackend {
    async fn synthesize(&self, request: &NarrationRequest) -> Result<NarrationAudio> {
        self.requests.lock().unwrap().push(request.clone());
        if self.gated {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| Error::NarrationFetch("gate closed".to_string()))?;
            permit.forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::NarrationFetch("mock synthesis failure".to_string()));
        }
        Ok(NarrationAudio {
            bytes: vec![0x52, 0x49, 0x46, 0x46],
            playback_rate: 1.0,
        })
    }
}

// ================================================================================
// MockAmbienceFetcher
// ================================================================================

pub struct MockAmbienceFetcher {
    urls: Mutex<Vec<String>>,
}

impl MockAmbienceFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AmbienceFetcher for MockAmbienceFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(vec![0u8; 16])
    }
}

// ================================================================================
// TestHarness
// ================================================================================

/// Fully wired controller over mocks
pub struct TestHarness {
    pub controller: Arc<PlaybackController>,
    pub narration_device: Arc<MockDevice>,
    pub ambience_device: Arc<MockDevice>,
    pub backend: Arc<MockNarrationBackend>,
    pub ambience: Arc<MockAmbienceFetcher>,
    pub shared: Arc<SharedState>,
}

impl TestHarness {
    pub async fn new(book: Book, page_turn: Duration, backend: Arc<MockNarrationBackend>) -> Self {
        let pool = db::init_memory_db().await.unwrap();
        let prefs = PreferenceStore::new(pool);
        let shared = Arc::new(SharedState::new());

        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let narration_device = MockDevice::new(AudioChannel::Narration, device_tx.clone());
        let ambience_device = MockDevice::new(AudioChannel::Ambience, device_tx);
        let ambience = MockAmbienceFetcher::new();

        let controller = PlaybackController::spawn(
            Uuid::new_v4(),
            book,
            narration_device.clone(),
            ambience_device.clone(),
            device_rx,
            backend.clone(),
            ambience.clone(),
            prefs,
            shared.clone(),
            ControllerOptions {
                page_turn_duration: page_turn,
                narration_language: "en".to_string(),
                narration_speed: 1.0,
                auto_advance: true,
            },
        );

        Self {
            controller,
            narration_device,
            ambience_device,
            backend,
            ambience,
            shared,
        }
    }

    /// Poll until the controller reaches `want` or the timeout passes
    pub async fn wait_for_state(&self, want: ReaderState, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.controller.reader_state().await == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

/// Poll a synchronous condition until it holds or the timeout passes
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Build a page with narration text and no ambient sound
pub fn page(text: &str) -> Page {
    Page {
        text: text.to_string(),
        image_ref: None,
        ambient_sound_url: None,
    }
}

/// Three plain pages
pub fn three_page_book() -> Book {
    Book {
        id: Uuid::new_v4(),
        title: "The Glass Forest".to_string(),
        pages: vec![
            page("A forest of glass trees hums in the wind."),
            page("A fox made of starlight crosses the clearing."),
            page("The dreamer wakes as the trees begin to chime."),
        ],
    }
}
