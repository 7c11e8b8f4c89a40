//! Live change stream over server-sent events.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::ApiResult;
use crate::state::AppState;

/// Open a live stream.
/// GET /api/stream
///
/// The first frame is `event: connected`; every change event follows as
/// `event: created|updated|deleted`. Closing the connection drops the
/// subscriber handle, which unsubscribes it.
pub async fn live_stream(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscriber = state.hub.subscribe()?;
    debug!(subscriber_id = subscriber.id(), "Live stream opened");

    let frames = subscriber.map(|frame| Ok(Event::default().event(frame.event()).data(frame.data())));
    let keep_alive = KeepAlive::new().interval(Duration::from_secs(state.config.stream.keep_alive_secs));

    Ok(Sse::new(frames).keep_alive(keep_alive))
}
