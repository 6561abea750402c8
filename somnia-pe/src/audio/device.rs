//! Playback device seam and rodio-backed implementation
//!
//! A `PlaybackDevice` wraps one playable audio resource: swap the source,
//! play, pause, reset to start, set volume. Completion and failure are
//! reported asynchronously as `DeviceEvent`s tagged with the source
//! generation, so events from an already-replaced source can be discarded by
//! the consumer.
//!
//! The rodio `OutputStream` is not `Send`, so `RodioDevice` owns it on a
//! dedicated thread and forwards commands over a channel. The command loop
//! doubles as the ended-detection poll while a source is playing.

use crate::error::{Error, Result};
use somnia_common::events::AudioChannel;
use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// One playable audio payload plus how to play it
#[derive(Debug, Clone)]
pub struct AudioSource {
    /// Complete encoded audio payload (as fetched from a collaborator)
    pub bytes: Vec<u8>,

    /// Playback rate multiplier (1.0 = natural rate); narration responses
    /// carry this in a header
    pub playback_rate: f32,

    /// Loop forever (ambience) instead of playing once (narration)
    pub looping: bool,
}

/// Event emitted by a playback device
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Which sink's device emitted this
    pub channel: AudioChannel,

    /// Generation of the source the event belongs to; consumers drop events
    /// whose generation no longer matches the sink's current source
    pub generation: u64,

    pub kind: DeviceEventKind,
}

/// What happened on the device
#[derive(Debug, Clone)]
pub enum DeviceEventKind {
    /// Non-looping source played to its end
    Ended,

    /// The device refused or lost playback (decode error, no source,
    /// output unavailable)
    Failed(String),
}

/// Playback device contract
///
/// All operations are non-blocking command issues; results that depend on
/// actual playback arrive as `DeviceEvent`s.
pub trait PlaybackDevice: Send + Sync {
    /// Replace the current source. Any previous playback is stopped and its
    /// resource released before the new source is accepted. The device does
    /// not start playing; call `play`.
    fn set_source(&self, source: AudioSource, generation: u64) -> Result<()>;

    /// Release the current source, stopping playback
    fn clear_source(&self);

    /// Start or resume playback of the current source
    fn play(&self) -> Result<()>;

    /// Pause playback, keeping the source and position
    fn pause(&self);

    /// Rewind to the start of the current source (paused)
    fn reset_to_start(&self);

    /// Set output volume (0.0-1.0)
    fn set_volume(&self, volume: f32);
}

/// Creates playback devices for a session
///
/// Seam for tests; production uses `RodioDeviceFactory`.
pub trait DeviceFactory: Send + Sync {
    fn create(
        &self,
        channel: AudioChannel,
        events: tokio::sync::mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<std::sync::Arc<dyn PlaybackDevice>>;
}

/// Production factory backed by the default rodio output
pub struct RodioDeviceFactory;

impl DeviceFactory for RodioDeviceFactory {
    fn create(
        &self,
        channel: AudioChannel,
        events: tokio::sync::mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<std::sync::Arc<dyn PlaybackDevice>> {
        Ok(std::sync::Arc::new(RodioDevice::spawn(channel, events)?))
    }
}

enum DeviceCommand {
    SetSource { source: AudioSource, generation: u64 },
    ClearSource,
    Play,
    Pause,
    ResetToStart,
    SetVolume(f32),
    Shutdown,
}

/// rodio-backed playback device
///
/// Owns the output stream on a dedicated thread; see module docs.
pub struct RodioDevice {
    channel: AudioChannel,
    tx: mpsc::Sender<DeviceCommand>,
}

impl RodioDevice {
    /// Spawn the device thread and open the default audio output.
    ///
    /// Blocks briefly until the output stream is opened so that a missing
    /// audio device surfaces at session mount, not at first play.
    pub fn spawn(
        channel: AudioChannel,
        events: tokio::sync::mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name(format!("somnia-audio-{}", channel))
            .spawn(move || device_thread(channel, rx, events, init_tx))
            .map_err(|e| Error::PlaybackDevice(format!("failed to spawn audio thread: {}", e)))?;

        init_rx
            .recv()
            .map_err(|_| Error::PlaybackDevice("audio thread exited during init".to_string()))?
            .map_err(Error::PlaybackDevice)?;

        Ok(Self { channel, tx })
    }

    fn send(&self, command: DeviceCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| {
            Error::PlaybackDevice(format!("{} audio thread is gone", self.channel))
        })
    }
}

impl PlaybackDevice for RodioDevice {
    fn set_source(&self, source: AudioSource, generation: u64) -> Result<()> {
        self.send(DeviceCommand::SetSource { source, generation })
    }

    fn clear_source(&self) {
        let _ = self.send(DeviceCommand::ClearSource);
    }

    fn play(&self) -> Result<()> {
        self.send(DeviceCommand::Play)
    }

    fn pause(&self) {
        let _ = self.send(DeviceCommand::Pause);
    }

    fn reset_to_start(&self) {
        let _ = self.send(DeviceCommand::ResetToStart);
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.send(DeviceCommand::SetVolume(volume.clamp(0.0, 1.0)));
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        let _ = self.tx.send(DeviceCommand::Shutdown);
    }
}

/// How often the command loop wakes to check for source completion
const ENDED_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn device_thread(
    channel: AudioChannel,
    commands: mpsc::Receiver<DeviceCommand>,
    events: tokio::sync::mpsc::UnboundedSender<DeviceEvent>,
    init_tx: mpsc::Sender<std::result::Result<(), String>>,
) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(format!("failed to open audio output: {}", e)));
            return;
        }
    };
    let _ = init_tx.send(Ok(()));

    let mut sink: Option<rodio::Sink> = None;
    let mut current: Option<(AudioSource, u64)> = None;
    let mut volume: f32 = 1.0;
    let mut playing = false;

    loop {
        match commands.recv_timeout(ENDED_POLL_INTERVAL) {
            Ok(DeviceCommand::SetSource { source, generation }) => {
                // Stop and release the previous source before accepting the
                // new one: no overlapping audio on one channel.
                if let Some(old) = sink.take() {
                    old.stop();
                }
                playing = false;
                match build_sink(&handle, &source, volume) {
                    Ok(new_sink) => {
                        sink = Some(new_sink);
                        current = Some((source, generation));
                    }
                    Err(reason) => {
                        current = None;
                        warn!("{}: source rejected: {}", channel, reason);
                        let _ = events.send(DeviceEvent {
                            channel,
                            generation,
                            kind: DeviceEventKind::Failed(reason),
                        });
                    }
                }
            }
            Ok(DeviceCommand::ClearSource) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                current = None;
                playing = false;
            }
            Ok(DeviceCommand::Play) => match (&sink, &current) {
                (Some(active), Some(_)) => {
                    active.play();
                    playing = true;
                }
                _ => {
                    let generation = current.as_ref().map(|(_, g)| *g).unwrap_or(0);
                    let _ = events.send(DeviceEvent {
                        channel,
                        generation,
                        kind: DeviceEventKind::Failed("no source set".to_string()),
                    });
                }
            },
            Ok(DeviceCommand::Pause) => {
                if let Some(active) = &sink {
                    active.pause();
                }
                playing = false;
            }
            Ok(DeviceCommand::ResetToStart) => {
                // rodio sinks cannot seek backwards; rebuild from the kept
                // payload, paused at the start.
                if let Some((source, generation)) = current.clone() {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    playing = false;
                    match build_sink(&handle, &source, volume) {
                        Ok(new_sink) => sink = Some(new_sink),
                        Err(reason) => {
                            current = None;
                            let _ = events.send(DeviceEvent {
                                channel,
                                generation,
                                kind: DeviceEventKind::Failed(reason),
                            });
                        }
                    }
                }
            }
            Ok(DeviceCommand::SetVolume(v)) => {
                volume = v;
                if let Some(active) = &sink {
                    active.set_volume(v);
                }
            }
            Ok(DeviceCommand::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {
                // Ended detection: a non-looping source drains its queue.
                if playing {
                    if let (Some(active), Some((_, generation))) = (&sink, &current) {
                        if active.empty() {
                            playing = false;
                            debug!("{}: source ended (generation {})", channel, generation);
                            let _ = events.send(DeviceEvent {
                                channel,
                                generation: *generation,
                                kind: DeviceEventKind::Ended,
                            });
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("{}: audio thread shut down", channel);
}

/// Build a paused sink holding the decoded source at position zero
fn build_sink(
    handle: &rodio::OutputStreamHandle,
    source: &AudioSource,
    volume: f32,
) -> std::result::Result<rodio::Sink, String> {
    use rodio::Source;

    let sink = rodio::Sink::try_new(handle).map_err(|e| format!("sink unavailable: {}", e))?;
    let decoder = rodio::Decoder::new(Cursor::new(source.bytes.clone()))
        .map_err(|e| format!("decode failed: {}", e))?;

    sink.pause();
    sink.set_volume(volume);
    if source.looping {
        sink.append(decoder.speed(source.playback_rate).repeat_infinite());
    } else {
        sink.append(decoder.speed(source.playback_rate));
    }
    Ok(sink)
}
