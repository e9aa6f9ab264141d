//! Server-sent event stream handler

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::game::GameError;
use crate::http::routes::AppError;
use crate::stream::protocol::ServerEvent;

/// Query parameters for opening a stream
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Session token from join
    #[serde(default)]
    pub token: Option<String>,
}

/// Attach a push stream to the caller's session
pub async fn stream_handler(
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let token = query.token.ok_or(GameError::Unauthenticated)?;
    let (role, events) = state.game.open_stream(token).await?;

    info!(role = ?role, "Push stream opened");
    Ok(Sse::new(event_stream(events)))
}

/// Turn the session's event channel into an SSE body. The body ends when
/// the game task drops the sender (session expired or stream replaced).
fn event_stream(
    events: mpsc::Receiver<ServerEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(events, |mut events| async move {
        loop {
            let event = events.recv().await?;
            match to_sse(&event) {
                Ok(sse) => return Some((Ok(sse), events)),
                Err(e) => warn!(event = event.name(), error = %e, "Failed to encode event"),
            }
        }
    })
}

/// Encode an event as a named SSE message with a JSON payload
pub fn to_sse(event: &ServerEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}
