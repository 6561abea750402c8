//! REST API implementation for the Playback Engine
//!
//! Control surface for one reading session: mount/unmount a book, start and
//! stop reading, navigate pages, adjust the two audio channels, and stream
//! engine events over SSE. Arrow-key navigation in clients arrives here as
//! the next/previous endpoints.

pub mod handlers;
pub mod sse;

use axum::{
    response::Html,
    routing::{get, post},
    Router,
};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::audio::device::DeviceFactory;
use crate::config::Config;
use crate::db::settings::PreferenceStore;
use crate::playback::PlaybackController;
use crate::remote::{AmbienceFetcher, NarrationBackend};
use crate::state::SharedState;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    /// Shared playback snapshot + event bus
    pub state: Arc<SharedState>,
    /// Preferences database pool
    pub db_pool: Pool<Sqlite>,
    /// Persisted reader preferences
    pub prefs: PreferenceStore,
    /// Narration synthesis collaborator
    pub narration_backend: Arc<dyn NarrationBackend>,
    /// Ambient sound download collaborator
    pub ambience_fetcher: Arc<dyn AmbienceFetcher>,
    /// Playback device creation (seam for tests)
    pub device_factory: Arc<dyn DeviceFactory>,
    /// The mounted reading session, if any
    pub session: Arc<RwLock<Option<Arc<PlaybackController>>>>,
    /// Engine configuration
    pub config: Config,
}

impl AppContext {
    /// The mounted session's controller, or `Error::NoSession`
    pub async fn controller(&self) -> crate::error::Result<Arc<PlaybackController>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(crate::error::Error::NoSession)
    }
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Developer UI
        .route("/", get(developer_ui))
        // Health check
        .route("/health", get(handlers::health))
        // Session lifecycle
        .route("/session", post(handlers::mount_book).delete(handlers::unmount_book))
        // Playback control
        .route("/playback/state", get(handlers::get_state))
        .route("/playback/start", post(handlers::start_reading))
        .route("/playback/stop", post(handlers::stop_reading))
        .route("/playback/next", post(handlers::next_page))
        .route("/playback/previous", post(handlers::previous_page))
        .route("/playback/auto-advance", post(handlers::set_auto_advance))
        // Volume control
        .route("/audio/volume", get(handlers::get_volume).post(handlers::set_volume))
        .route("/audio/mute", post(handlers::toggle_mute))
        // Preferences
        .route("/preferences", get(handlers::get_preferences).put(handlers::set_preferences))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Developer UI (embedded HTML page with keyboard navigation)
async fn developer_ui() -> Html<&'static str> {
    Html(include_str!("developer_ui.html"))
}
