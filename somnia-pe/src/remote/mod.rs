//! External collaborator clients
//!
//! The engine does not synthesize speech or choose ambient sounds; it
//! consumes both as simple request/response HTTP collaborators. Each client
//! sits behind a trait so tests can substitute deterministic fakes.

pub mod ambience;
pub mod narration;

pub use ambience::{AmbienceFetcher, HttpAmbienceFetcher};
pub use narration::{
    HttpNarrationBackend, NarrationAudio, NarrationBackend, NarrationRequest, NarrationRequester,
};
