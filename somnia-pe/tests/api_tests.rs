//! HTTP API integration tests
//!
//! Drives the axum router directly with tower `oneshot`, with mock
//! collaborators behind the AppContext.

#[allow(dead_code)]
mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use helpers::{MockAmbienceFetcher, MockDeviceFactory, MockNarrationBackend};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use somnia_pe::api::{create_router, AppContext};
use somnia_pe::config::Config;
use somnia_pe::db;
use somnia_pe::db::settings::PreferenceStore;
use somnia_pe::state::SharedState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

async fn test_context() -> (AppContext, Arc<MockDeviceFactory>) {
    let pool = db::init_memory_db().await.unwrap();
    let factory = MockDeviceFactory::new();
    let ctx = AppContext {
        state: Arc::new(SharedState::new()),
        db_pool: pool.clone(),
        prefs: PreferenceStore::new(pool),
        narration_backend: MockNarrationBackend::new(),
        ambience_fetcher: MockAmbienceFetcher::new(),
        device_factory: factory.clone(),
        session: Arc::new(RwLock::new(None)),
        config: Config::new(
            PathBuf::from("/tmp/somnia-test"),
            0,
            "http://localhost:5860".to_string(),
            30,
        ),
    };
    (ctx, factory)
}

async fn request(
    ctx: &AppContext,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let router = create_router(ctx.clone());
    let request = match body {
        Some(json_body) => Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn sample_book() -> Value {
    json!({
        "title": "The Paper Lighthouse",
        "pages": [
            { "text": "A lighthouse folds itself out of paper." },
            { "text": "Its beam is a ribbon of ink.",
              "ambient_sound_url": "https://sounds.example/sea.ogg" }
        ]
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (ctx, _) = test_context().await;
    let (status, body) = request(&ctx, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "playback_engine");
}

#[tokio::test]
async fn test_playback_state_without_session() {
    let (ctx, _) = test_context().await;
    let (status, body) = request(&ctx, "GET", "/playback/state", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_null());
    assert_eq!(body["page_count"], 0);
}

#[tokio::test]
async fn test_playback_control_requires_session() {
    let (ctx, _) = test_context().await;

    let (status, _) = request(
        &ctx,
        "POST",
        "/playback/start",
        Some(json!({ "page_index": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(&ctx, "POST", "/playback/next", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mount_and_unmount_session() {
    let (ctx, factory) = test_context().await;

    let (status, body) = request(&ctx, "POST", "/session", Some(sample_book())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page_count"], 2);
    assert!(body["session_id"].is_string());
    assert!(factory
        .device(somnia_common::events::AudioChannel::Narration)
        .is_some());

    let (status, body) = request(&ctx, "GET", "/playback/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page_count"], 2);
    assert_eq!(body["title"], "The Paper Lighthouse");

    let (status, body) = request(&ctx, "DELETE", "/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unmounted");

    let (_, body) = request(&ctx, "GET", "/playback/state", None).await;
    assert!(body["session_id"].is_null());
}

#[tokio::test]
async fn test_mount_rejects_invalid_book() {
    let (ctx, _) = test_context().await;

    let (status, _) = request(&ctx, "POST", "/session", Some(json!({ "pages": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_reading_out_of_range_page() {
    let (ctx, _) = test_context().await;
    request(&ctx, "POST", "/session", Some(sample_book())).await;

    let (status, _) = request(
        &ctx,
        "POST",
        "/playback/start",
        Some(json!({ "page_index": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_volume_and_mute_endpoints() {
    let (ctx, _) = test_context().await;
    request(&ctx, "POST", "/session", Some(sample_book())).await;

    let (status, _) = request(
        &ctx,
        "POST",
        "/audio/volume",
        Some(json!({ "channel": "ambience", "volume": 0.25 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request(&ctx, "GET", "/audio/volume", None).await;
    assert_eq!(body["ambience"]["volume"], 0.25);
    assert_eq!(body["ambience"]["muted"], false);

    let (_, body) = request(
        &ctx,
        "POST",
        "/audio/mute",
        Some(json!({ "channel": "ambience" })),
    )
    .await;
    assert_eq!(body["muted"], true);
    assert_eq!(body["volume"], 0.0);

    let (_, body) = request(
        &ctx,
        "POST",
        "/audio/mute",
        Some(json!({ "channel": "ambience" })),
    )
    .await;
    assert_eq!(body["muted"], false);
    assert_eq!(body["volume"], 0.25);
}

#[tokio::test]
async fn test_preferences_round_trip() {
    let (ctx, _) = test_context().await;

    let (status, body) = request(&ctx, "GET", "/preferences", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_advance_enabled"], true);
    assert_eq!(body["page_layout_landscape"], false);

    let (status, body) = request(
        &ctx,
        "PUT",
        "/preferences",
        Some(json!({ "auto_advance_enabled": false, "page_layout_landscape": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_advance_enabled"], false);
    assert_eq!(body["page_layout_landscape"], true);

    // Persisted: a fresh read sees the written values
    let (_, body) = request(&ctx, "GET", "/preferences", None).await;
    assert_eq!(body["auto_advance_enabled"], false);
    assert_eq!(body["page_layout_landscape"], true);
}
