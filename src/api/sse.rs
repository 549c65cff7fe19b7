use crate::chat::Notification;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Stream notifications as SSE events named after their kind.
pub fn build_sse_response(
    rx: broadcast::Receiver<Notification>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let stream = BroadcastStream::new(rx)
        .filter_map(|item| async move {
            match item {
                Ok(notification) => Some(notification),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(name: "sse.lagged", skipped, "Notification stream lagged");
                    None
                }
            }
        })
        .map(|notification| {
            let json = serde_json::to_string(&notification).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().event(notification.kind.as_str()).data(json))
        });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
