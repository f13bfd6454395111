use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::response::AppError;
use crate::routes::sessions::load_session;
use crate::sessions::SessionEvent;
use crate::state::AppState;

static SSE_CONNECTION_COUNT: AtomicUsize = AtomicUsize::new(0);

struct SseGuard;
impl Drop for SseGuard {
    fn drop(&mut self) {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:id/events", get(sse_handler))
}

pub async fn sse_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = load_session(&state, &id).await?;

    let max_sse = state.config().limits.max_sse_connections;
    let current = SSE_CONNECTION_COUNT.fetch_add(1, Ordering::SeqCst);
    if current >= max_sse {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
        return Err(AppError::too_many_requests("Too many SSE connections"));
    }
    let guard = SseGuard;

    let (mut events, stopped_summary) = {
        let live = session.lock().await;
        (live.subscribe(), live.report().map(|r| r.summary.clone()))
    };
    let mut shutdown_rx = state.shutdown_rx();
    tracing::debug!(session_id = %id, "SSE subscriber attached");

    let stream = async_stream::stream! {
        let _guard = guard;
        // 已结束的会话只回放一次结束事件
        if let Some(summary) = stopped_summary {
            if let Ok(json) = serde_json::to_string(&summary) {
                yield Ok(Event::default().event("stopped").data(json));
            }
            return;
        }

        loop {
            tokio::select! {
                received = events.recv() => {
                    match received {
                        Ok(SessionEvent::Frame(update)) => {
                            if let Ok(json) = serde_json::to_string(&update) {
                                yield Ok(Event::default().event("frame").data(json));
                            }
                            if let Some(lines) = update.recommendation {
                                let payload = serde_json::json!({
                                    "timestamp": update.timestamp,
                                    "level": update.assessment.level,
                                    "lines": lines,
                                });
                                yield Ok(Event::default().event("recommendation").data(payload.to_string()));
                            }
                        }
                        Ok(SessionEvent::Stopped { summary }) => {
                            if let Ok(json) = serde_json::to_string(&summary) {
                                yield Ok(Event::default().event("stopped").data(json));
                            }
                            break;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(session_id = %id, skipped, "SSE subscriber lagged, frames dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
