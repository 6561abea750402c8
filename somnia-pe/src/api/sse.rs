//! SSE event stream for real-time client updates

use crate::api::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// GET /events - subscribe to the engine event stream
///
/// Each `SomniaEvent` is emitted as an SSE event named after its type with
/// the serialized event as JSON data.
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let rx = ctx.state.subscribe_events();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(somnia_event) => Event::default()
                .event(somnia_event.event_type())
                .json_data(&somnia_event)
                .ok()
                .map(Ok),
            Err(e) => {
                // BroadcastStream wraps RecvError (client lagged); log and
                // continue with the next event.
                warn!("SSE client lagged: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
