//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`sr_core::events::EventBus`], optionally filters by
//! story, replays recent events for late joiners, and sends keepalive
//! heartbeats.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use sr_core::StoryId;
use std::convert::Infallible;
use std::time::Duration;

use crate::context::AppContext;

/// Optional query parameter for story filtering.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only forward events for this story.
    pub story_id: Option<String>,
}

/// GET /api/events -- SSE stream of render job events.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    // An unparseable filter matches nothing rather than everything.
    let filter = params.story_id.map(|s| s.parse::<StoryId>().ok());

    let recent = ctx.event_bus.recent_events(50);
    let mut rx = ctx.event_bus.subscribe();

    let stream = async_stream::stream! {
        for event in recent.into_iter().rev() {
            if matches_story(&event.payload, &filter) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if matches_story(&event.payload, &filter) {
                                if let Ok(data) = serde_json::to_string(&event) {
                                    yield Ok(Event::default().data(data));
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn matches_story(payload: &sr_core::events::EventPayload, filter: &Option<Option<StoryId>>) -> bool {
    match filter {
        None => true,
        Some(wanted) => *wanted == Some(payload.story_id()),
    }
}
