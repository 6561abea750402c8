//! Playback orchestration
//!
//! **Module structure:**
//! - `controller.rs`: the single-writer state machine driving narration,
//!   ambience, and page turns
//! - `transition.rs`: page turn animation timing and the one-in-flight rule

pub mod controller;
pub mod transition;

pub use controller::{ControllerOptions, PlaybackController};
pub use transition::PageTransitionCoordinator;
