//! SSE response assembly for the streaming path.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use tokio_stream::StreamExt;

use crate::api::handlers::map_proxy_error;
use crate::api::types::{ChatRequest, ErrorResponse};
use crate::api::AppState;

/// Open the upstream stream, then bridge restored payloads into SSE
/// events. Pipeline errors before the first byte map to proper HTTP
/// statuses; errors mid-stream become a terminal error event, since the
/// status line is already on the wire.
pub(crate) async fn handle_streaming(
    state: Arc<AppState>,
    request: ChatRequest,
    tenant: String,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let rx = state
        .proxy
        .chat_completion_stream(request, &tenant)
        .await
        .map_err(map_proxy_error)?;

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|item| {
        let event = match item {
            Ok(payload) => Event::default().data(payload),
            Err(err) => {
                let body = ErrorResponse::new(err.to_string(), "upstream_error", None);
                let data = serde_json::to_string(&body)
                    .unwrap_or_else(|_| r#"{"error":{"message":"stream failed"}}"#.to_string());
                Event::default().event("error").data(data)
            }
        };
        Ok::<Event, std::convert::Infallible>(event)
    });

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().text(""));
    Ok(sse.into_response())
}
