//! Per-channel volume state with lossless mute round-trips
//!
//! `toggle_mute` stores the level in effect at mute time and restores
//! exactly that value on the next toggle, not a default. Repeated toggles
//! are lossless: `set_volume(v); toggle_mute(); toggle_mute()` yields `v`.

use somnia_common::events::AudioChannel;

#[derive(Debug, Clone)]
struct ChannelVolume {
    volume: f32,
    /// Level to restore on unmute; `Some` while muted
    muted_previous: Option<f32>,
}

impl ChannelVolume {
    fn new(volume: f32) -> Self {
        Self {
            volume,
            muted_previous: None,
        }
    }
}

/// Volume state for both session channels
#[derive(Debug, Clone)]
pub struct VolumeMixer {
    narration: ChannelVolume,
    ambience: ChannelVolume,
}

/// Default narration level on a fresh session
const DEFAULT_NARRATION_VOLUME: f32 = 1.0;
/// Ambience sits under the narration by default
const DEFAULT_AMBIENCE_VOLUME: f32 = 0.5;

impl VolumeMixer {
    pub fn new() -> Self {
        Self {
            narration: ChannelVolume::new(DEFAULT_NARRATION_VOLUME),
            ambience: ChannelVolume::new(DEFAULT_AMBIENCE_VOLUME),
        }
    }

    fn channel(&self, channel: AudioChannel) -> &ChannelVolume {
        match channel {
            AudioChannel::Narration => &self.narration,
            AudioChannel::Ambience => &self.ambience,
        }
    }

    fn channel_mut(&mut self, channel: AudioChannel) -> &mut ChannelVolume {
        match channel {
            AudioChannel::Narration => &mut self.narration,
            AudioChannel::Ambience => &mut self.ambience,
        }
    }

    /// Current level for a channel (0.0 while muted)
    pub fn volume(&self, channel: AudioChannel) -> f32 {
        self.channel(channel).volume
    }

    pub fn is_muted(&self, channel: AudioChannel) -> bool {
        self.channel(channel).muted_previous.is_some()
    }

    /// Set a channel's level explicitly.
    ///
    /// An explicit set while muted supersedes the mute memory: the slider
    /// move is what the user now wants, so the stored pre-mute level is
    /// dropped. Returns the clamped level applied.
    pub fn set_volume(&mut self, channel: AudioChannel, volume: f32) -> f32 {
        let clamped = volume.clamp(0.0, 1.0);
        let ch = self.channel_mut(channel);
        ch.volume = clamped;
        ch.muted_previous = None;
        clamped
    }

    /// Toggle mute, remembering and restoring the pre-mute level exactly.
    ///
    /// Returns the level now in effect.
    pub fn toggle_mute(&mut self, channel: AudioChannel) -> f32 {
        let ch = self.channel_mut(channel);
        match ch.muted_previous.take() {
            Some(previous) => {
                ch.volume = previous;
            }
            None => {
                ch.muted_previous = Some(ch.volume);
                ch.volume = 0.0;
            }
        }
        ch.volume
    }
}

impl Default for VolumeMixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_round_trip_is_lossless() {
        let mut mixer = VolumeMixer::new();
        mixer.set_volume(AudioChannel::Narration, 0.37);

        assert_eq!(mixer.toggle_mute(AudioChannel::Narration), 0.0);
        assert!(mixer.is_muted(AudioChannel::Narration));

        assert_eq!(mixer.toggle_mute(AudioChannel::Narration), 0.37);
        assert!(!mixer.is_muted(AudioChannel::Narration));
    }

    #[test]
    fn test_repeated_toggles_stay_lossless() {
        let mut mixer = VolumeMixer::new();
        mixer.set_volume(AudioChannel::Ambience, 0.8);
        for _ in 0..3 {
            mixer.toggle_mute(AudioChannel::Ambience);
            mixer.toggle_mute(AudioChannel::Ambience);
        }
        assert_eq!(mixer.volume(AudioChannel::Ambience), 0.8);
    }

    #[test]
    fn test_set_volume_clears_mute_memory() {
        let mut mixer = VolumeMixer::new();
        mixer.set_volume(AudioChannel::Narration, 0.6);
        mixer.toggle_mute(AudioChannel::Narration);

        // Slider move while muted wins over the mute memory
        mixer.set_volume(AudioChannel::Narration, 0.25);
        assert!(!mixer.is_muted(AudioChannel::Narration));
        assert_eq!(mixer.volume(AudioChannel::Narration), 0.25);

        // The next toggle mutes from the new level
        mixer.toggle_mute(AudioChannel::Narration);
        assert_eq!(mixer.volume(AudioChannel::Narration), 0.0);
        assert_eq!(mixer.toggle_mute(AudioChannel::Narration), 0.25);
    }

    #[test]
    fn test_volumes_are_clamped() {
        let mut mixer = VolumeMixer::new();
        assert_eq!(mixer.set_volume(AudioChannel::Narration, 1.5), 1.0);
        assert_eq!(mixer.set_volume(AudioChannel::Narration, -0.5), 0.0);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut mixer = VolumeMixer::new();
        mixer.set_volume(AudioChannel::Narration, 0.9);
        mixer.set_volume(AudioChannel::Ambience, 0.2);
        mixer.toggle_mute(AudioChannel::Ambience);

        assert_eq!(mixer.volume(AudioChannel::Narration), 0.9);
        assert_eq!(mixer.volume(AudioChannel::Ambience), 0.0);
        assert!(!mixer.is_muted(AudioChannel::Narration));
    }
}
