//! Audio output layer
//!
//! Two independent sinks (narration, ambience) drive a playback device
//! behind a trait seam, so the controller can be exercised in tests without
//! real audio hardware. The production device decodes and plays complete
//! fetched payloads via rodio.

pub mod device;
pub mod mixer;
pub mod sink;

pub use device::{AudioSource, DeviceEvent, DeviceEventKind, DeviceFactory, PlaybackDevice};
pub use mixer::VolumeMixer;
pub use sink::AudioSink;
