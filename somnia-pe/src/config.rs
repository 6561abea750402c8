//! somnia-pe specific configuration

use std::path::PathBuf;
use std::time::Duration;

/// Playback Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory (holds the preferences database)
    pub data_dir: PathBuf,

    /// Preferences database path
    pub db_path: PathBuf,

    /// HTTP bind address
    pub bind_addr: String,

    /// Base URL of the narration synthesis collaborator
    pub tts_base_url: String,

    /// Narration language code sent to the collaborator
    pub narration_language: String,

    /// Narration speed multiplier sent to the collaborator
    pub narration_speed: f32,

    /// Fixed page turn animation duration; the synchronization barrier
    /// between transitions and narration
    pub page_turn_duration: Duration,
}

impl Config {
    /// Derive the full config from a resolved data directory and CLI values
    pub fn new(
        data_dir: PathBuf,
        port: u16,
        tts_base_url: String,
        page_turn_ms: u64,
    ) -> Self {
        let db_path = data_dir.join("somnia.db");
        Self {
            data_dir,
            db_path,
            bind_addr: format!("0.0.0.0:{}", port),
            tts_base_url,
            narration_language: "en".to_string(),
            narration_speed: 1.0,
            page_turn_duration: Duration::from_millis(page_turn_ms),
        }
    }
}
