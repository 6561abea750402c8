//! # Somnia Playback Engine Library (somnia-pe)
//!
//! Narrates multi-page illustrated dream books aloud, keeps an ambient
//! background soundscape in sync with the visible page, auto-advances pages
//! when narration ends, and lets the reader interrupt/resume/navigate at any
//! time without leaking audio resources or desynchronizing audio from the
//! visible page.
//!
//! **Architecture:** single-writer controller state machine driving two
//! passive audio sinks (narration, ambience) and a page transition
//! coordinator, with an HTTP/SSE control interface. Text-to-speech synthesis
//! and ambient sound hosting are external collaborators reached over HTTP.

pub mod api;
pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod remote;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
