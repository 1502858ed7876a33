use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tracing::warn;

use abi::errors::{Error, Result};

use crate::api_utils::custom_extract::AuthExtractor;
use crate::AppState;

const REQUESTS_EVENT: &str = "requests";
const FRIENDS_EVENT: &str = "friends";
const ERROR_EVENT: &str = "error";

/// Server-sent events carrying full snapshots of the caller's pending
/// requests (`requests`) and friends (`friends`) whenever either changes.
pub async fn friend_events(
    State(app_state): State<AppState>,
    AuthExtractor(user_id): AuthExtractor,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let requests = app_state
        .service
        .watch_incoming_requests(&user_id)?
        .map(|snapshot| snapshot_event(REQUESTS_EVENT, snapshot));
    let friends = app_state
        .service
        .watch_friends(&user_id)?
        .map(|snapshot| snapshot_event(FRIENDS_EVENT, snapshot));

    Ok(Sse::new(stream::select(requests, friends)).keep_alive(KeepAlive::default()))
}

fn snapshot_event<T: Serialize>(name: &str, snapshot: Result<Vec<T>>) -> Result<Event, Infallible> {
    let event = match snapshot.map(|items| Event::default().event(name).json_data(items)) {
        Ok(Ok(event)) => event,
        Ok(Err(e)) => {
            warn!("encode {} snapshot failed: {}", name, e);
            Event::default().event(ERROR_EVENT).data(e.to_string())
        }
        Err(e) => {
            warn!("{} snapshot failed: {}", name, e);
            Event::default().event(ERROR_EVENT).data(e.to_string())
        }
    };
    Ok(event)
}
