//! HTTP request handlers
//!
//! Implements the REST endpoints for session and playback control.

use crate::api::AppContext;
use crate::audio::device::DeviceEvent;
use crate::error::Error;
use crate::playback::{ControllerOptions, PlaybackController};
use crate::state::PlaybackSnapshot;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use somnia_common::events::{AudioChannel, Direction, SomniaEvent};
use somnia_common::Book;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct MountResponse {
    session_id: Uuid,
    book_id: Uuid,
    page_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct StartReadingRequest {
    /// Page to read
    pub page_index: usize,
    /// Auto-advance override; omitted keeps the session's current flag
    pub auto_advance: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NavigateResponse {
    /// Destination page, or null when the request was a no-op (book edge or
    /// a page turn already in flight)
    page_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AutoAdvanceRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub channel: AudioChannel,
    /// Level 0.0-1.0
    pub volume: f32,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub channel: AudioChannel,
}

#[derive(Debug, Serialize)]
pub struct ChannelVolumeInfo {
    volume: f32,
    muted: bool,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    narration: ChannelVolumeInfo,
    ambience: ChannelVolumeInfo,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    auto_advance_enabled: bool,
    page_layout_landscape: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub auto_advance_enabled: Option<bool>,
    pub page_layout_landscape: Option<bool>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: Error) -> ApiError {
    let status = match &err {
        Error::PageOutOfRange { .. } | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::NoSession => StatusCode::NOT_FOUND,
        Error::InvalidState(_) | Error::TransitionBusy => StatusCode::CONFLICT,
        Error::NarrationFetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "playback_engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// POST /session - mount a book and create a reading session
///
/// Any previously mounted session is torn down first: all audio paused,
/// pending requests cancelled, resource handles released.
pub async fn mount_book(
    State(ctx): State<AppContext>,
    Json(book): Json<Book>,
) -> Result<Json<MountResponse>, ApiError> {
    book.validate().map_err(|e| error_response(e.into()))?;

    let mut session = ctx.session.write().await;

    if let Some(previous) = session.take() {
        previous.shutdown().await;
        ctx.state.broadcast_event(SomniaEvent::SessionUnmounted {
            session_id: previous.session_id(),
            timestamp: chrono::Utc::now(),
        });
    }

    let (device_tx, device_rx) = mpsc::unbounded_channel::<DeviceEvent>();
    let narration_device = ctx
        .device_factory
        .create(AudioChannel::Narration, device_tx.clone())
        .map_err(error_response)?;
    let ambience_device = ctx
        .device_factory
        .create(AudioChannel::Ambience, device_tx)
        .map_err(error_response)?;

    // Preferences are read once, at session start.
    let auto_advance = ctx
        .prefs
        .auto_advance_enabled()
        .await
        .map_err(error_response)?;

    let session_id = Uuid::new_v4();
    let book_id = book.id;
    let title = book.title.clone();
    let page_count = book.page_count();

    let controller = PlaybackController::spawn(
        session_id,
        book,
        narration_device,
        ambience_device,
        device_rx,
        ctx.narration_backend.clone(),
        ctx.ambience_fetcher.clone(),
        ctx.prefs.clone(),
        ctx.state.clone(),
        ControllerOptions {
            page_turn_duration: ctx.config.page_turn_duration,
            narration_language: ctx.config.narration_language.clone(),
            narration_speed: ctx.config.narration_speed,
            auto_advance,
        },
    );
    *session = Some(controller);

    ctx.state
        .session_mounted(session_id, book_id, title.clone(), page_count, auto_advance)
        .await;
    ctx.state.broadcast_event(SomniaEvent::SessionMounted {
        session_id,
        book_id,
        title,
        page_count,
        timestamp: chrono::Utc::now(),
    });
    info!("Mounted book {} as session {}", book_id, session_id);

    Ok(Json(MountResponse {
        session_id,
        book_id,
        page_count,
    }))
}

/// DELETE /session - tear the session down
pub async fn unmount_book(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let mut session = ctx.session.write().await;

    match session.take() {
        Some(controller) => {
            controller.shutdown().await;
            ctx.state.session_unmounted().await;
            ctx.state.broadcast_event(SomniaEvent::SessionUnmounted {
                session_id: controller.session_id(),
                timestamp: chrono::Utc::now(),
            });
            Json(StatusResponse {
                status: "unmounted".to_string(),
            })
        }
        None => Json(StatusResponse {
            status: "no_session".to_string(),
        }),
    }
}

// ============================================================================
// Playback control
// ============================================================================

/// GET /playback/state
pub async fn get_state(State(ctx): State<AppContext>) -> Json<PlaybackSnapshot> {
    Json(ctx.state.snapshot().await)
}

/// POST /playback/start
pub async fn start_reading(
    State(ctx): State<AppContext>,
    Json(request): Json<StartReadingRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    let auto_advance = match request.auto_advance {
        Some(enabled) => enabled,
        None => controller.auto_advance().await,
    };
    controller
        .start_reading(request.page_index, auto_advance)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        status: "reading".to_string(),
    }))
}

/// POST /playback/stop
pub async fn stop_reading(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    controller.stop_reading().await;
    Ok(Json(StatusResponse {
        status: "stopped".to_string(),
    }))
}

/// POST /playback/next
pub async fn next_page(
    State(ctx): State<AppContext>,
) -> Result<Json<NavigateResponse>, ApiError> {
    navigate(ctx, Direction::Next).await
}

/// POST /playback/previous
pub async fn previous_page(
    State(ctx): State<AppContext>,
) -> Result<Json<NavigateResponse>, ApiError> {
    navigate(ctx, Direction::Prev).await
}

async fn navigate(ctx: AppContext, direction: Direction) -> Result<Json<NavigateResponse>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    let page_index = controller
        .manual_navigate(direction)
        .await
        .map_err(error_response)?;
    Ok(Json(NavigateResponse { page_index }))
}

/// POST /playback/auto-advance
pub async fn set_auto_advance(
    State(ctx): State<AppContext>,
    Json(request): Json<AutoAdvanceRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    controller.set_auto_advance(request.enabled).await;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

// ============================================================================
// Volume control
// ============================================================================

/// GET /audio/volume
pub async fn get_volume(State(ctx): State<AppContext>) -> Json<VolumeResponse> {
    let snapshot = ctx.state.snapshot().await;
    Json(VolumeResponse {
        narration: ChannelVolumeInfo {
            volume: snapshot.narration_volume,
            muted: snapshot.narration_muted,
        },
        ambience: ChannelVolumeInfo {
            volume: snapshot.ambience_volume,
            muted: snapshot.ambience_muted,
        },
    })
}

/// POST /audio/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    controller
        .set_channel_volume(request.channel, request.volume)
        .await;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// POST /audio/mute
pub async fn toggle_mute(
    State(ctx): State<AppContext>,
    Json(request): Json<MuteRequest>,
) -> Result<Json<ChannelVolumeInfo>, ApiError> {
    let controller = ctx.controller().await.map_err(error_response)?;
    let volume = controller.toggle_mute(request.channel).await;
    let snapshot = ctx.state.snapshot().await;
    let muted = match request.channel {
        AudioChannel::Narration => snapshot.narration_muted,
        AudioChannel::Ambience => snapshot.ambience_muted,
    };
    Ok(Json(ChannelVolumeInfo { volume, muted }))
}

// ============================================================================
// Preferences
// ============================================================================

/// GET /preferences
pub async fn get_preferences(
    State(ctx): State<AppContext>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let auto_advance_enabled = ctx
        .prefs
        .auto_advance_enabled()
        .await
        .map_err(error_response)?;
    let page_layout_landscape = ctx
        .prefs
        .page_layout_landscape()
        .await
        .map_err(error_response)?;
    Ok(Json(PreferencesResponse {
        auto_advance_enabled,
        page_layout_landscape,
    }))
}

/// PUT /preferences
///
/// Writes happen synchronously on each change; the live session (if any)
/// picks up an auto-advance change immediately.
pub async fn set_preferences(
    State(ctx): State<AppContext>,
    Json(request): Json<PreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    if let Some(enabled) = request.auto_advance_enabled {
        match ctx.session.read().await.clone() {
            Some(controller) => controller.set_auto_advance(enabled).await,
            None => {
                ctx.prefs
                    .set_auto_advance_enabled(enabled)
                    .await
                    .map_err(error_response)?;
                ctx.state.broadcast_event(SomniaEvent::PreferenceChanged {
                    key: crate::db::settings::KEY_AUTO_ADVANCE.to_string(),
                    value: enabled,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    if let Some(landscape) = request.page_layout_landscape {
        ctx.prefs
            .set_page_layout_landscape(landscape)
            .await
            .map_err(error_response)?;
        ctx.state.broadcast_event(SomniaEvent::PreferenceChanged {
            key: crate::db::settings::KEY_PAGE_LAYOUT_LANDSCAPE.to_string(),
            value: landscape,
            timestamp: chrono::Utc::now(),
        });
    }

    get_preferences(State(ctx)).await
}
