//! Audio sink wrapper
//!
//! Thin stateful wrapper around one playback device channel. Tracks the
//! `ChannelState` the rest of the engine reasons about (source present,
//! playing, volume, source generation) and enforces the source-swap rule:
//! the previous resource is stopped and released before a new one plays.

use crate::audio::device::{AudioSource, PlaybackDevice};
use crate::error::{Error, Result};
use somnia_common::events::AudioChannel;
use std::sync::Arc;

/// Mutable state of one audio channel
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// A source is currently assigned to the device
    pub has_source: bool,

    /// Channel volume (0.0-1.0); the mixer owns the authoritative value,
    /// this mirrors what was last applied to the device
    pub volume: f32,

    /// Playback was started and has not been paused/stopped/ended
    pub is_playing: bool,

    /// Monotonic source generation; bumped on every swap so device events
    /// from replaced sources can be recognized as stale
    pub generation: u64,
}

/// One playable audio channel (narration or ambience)
pub struct AudioSink {
    channel: AudioChannel,
    device: Arc<dyn PlaybackDevice>,
    state: ChannelState,
}

impl AudioSink {
    pub fn new(channel: AudioChannel, device: Arc<dyn PlaybackDevice>) -> Self {
        Self {
            channel,
            device,
            state: ChannelState {
                has_source: false,
                volume: 1.0,
                is_playing: false,
                generation: 0,
            },
        }
    }

    pub fn channel(&self) -> AudioChannel {
        self.channel
    }

    /// Assign a new source, releasing any previous one.
    ///
    /// Returns the generation assigned to the new source; device events
    /// carrying an older generation belong to the replaced source.
    pub fn set_source(&mut self, source: AudioSource) -> Result<u64> {
        self.state.generation += 1;
        self.state.is_playing = false;
        self.device.set_source(source, self.state.generation)?;
        self.state.has_source = true;
        Ok(self.state.generation)
    }

    /// Start playback of the assigned source
    pub fn play(&mut self) -> Result<()> {
        if !self.state.has_source {
            return Err(Error::PlaybackDevice(format!(
                "{}: play without a source",
                self.channel
            )));
        }
        self.device.play()?;
        self.state.is_playing = true;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state.has_source {
            self.device.pause();
        }
        self.state.is_playing = false;
    }

    /// Rewind the playhead to the start (paused)
    pub fn reset_to_start(&mut self) {
        if self.state.has_source {
            self.device.reset_to_start();
        }
        self.state.is_playing = false;
    }

    /// Release the assigned source entirely
    pub fn clear_source(&mut self) {
        if self.state.has_source {
            // Bump generation so late events from the released source are
            // recognizably stale.
            self.state.generation += 1;
            self.device.clear_source();
            self.state.has_source = false;
        }
        self.state.is_playing = false;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.state.volume = clamped;
        self.device.set_volume(clamped);
    }

    /// Playback ended on the device (device event already currency-checked)
    pub fn mark_ended(&mut self) {
        self.state.is_playing = false;
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn has_source(&self) -> bool {
        self.state.has_source
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }
}

impl std::fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSink")
            .field("channel", &self.channel)
            .field("state", &self.state)
            .finish()
    }
}
