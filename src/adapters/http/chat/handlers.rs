//! HTTP handlers for chat endpoints
//!
//! These handlers connect Axum routes to the relay turn handler.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::handlers::relay::{
    ErrorEnvelope, ErrorPayload, FrameStream, RelayError, RelayTurnHandler, ResponseChannel,
    StreamOutcome,
};
use crate::domain::foundation::ValidationError;

use super::dto::{HealthResponse, TurnRequest};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct ChatAppState {
    pub relay: Arc<RelayTurnHandler>,
}

impl ChatAppState {
    pub fn new(relay: Arc<RelayTurnHandler>) -> Self {
        Self { relay }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// Relay one chat turn and stream the answer as server-sent events
///
/// POST /api/chat
pub async fn relay_turn(
    State(state): State<ChatAppState>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Response {
    let span = info_span!("chat_turn", request_id = %Uuid::new_v4());

    async move {
        let Json(req) = match payload {
            Ok(body) => body,
            Err(rejection) => {
                let err = ValidationError::invalid_format("body", rejection.body_text());
                return error_response(&state, RelayError::Validation(err));
            }
        };

        let cmd = match req.into_command() {
            Ok(cmd) => cmd,
            Err(err) => return error_response(&state, RelayError::Validation(err)),
        };

        let chat_id = cmd.chat_id();
        let turn = match state.relay.prepare(cmd).await {
            Ok(turn) => turn,
            Err(err) => return error_response(&state, err),
        };
        info!(chat_id = %chat_id, "Turn accepted, streaming");

        let (mut channel, frames) = ResponseChannel::open(&state.relay.settings().channel_config());
        let relay = state.relay.clone();
        tokio::spawn(
            async move {
                if let StreamOutcome::Cancelled { tokens } = relay.stream(turn, &mut channel).await
                {
                    warn!(chat_id = %chat_id, tokens, "Client went away mid-stream");
                }
            }
            .in_current_span(),
        );

        event_stream_response(frames)
    }
    .instrument(span)
    .await
}

/// Liveness probe
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

// ════════════════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════════════════

fn error_response(state: &ChatAppState, err: RelayError) -> Response {
    let payload = state.relay.translator().translate(&err);
    warn!(kind = %payload.kind, status = payload.status_code, "Turn rejected");
    payload_response(payload)
}

fn payload_response(payload: ErrorPayload) -> Response {
    let status =
        StatusCode::from_u16(payload.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorEnvelope::from(payload))).into_response()
}

fn event_stream_response(frames: FrameStream) -> Response {
    let mut response = Response::new(Body::from_stream(frames.map(Ok::<_, Infallible>)));
    let headers = response.headers_mut();
    for &(name, value) in ResponseChannel::headers() {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_response_uses_payload_status() {
        let response = payload_response(ErrorPayload::new("slow down", "rate_limited", 429));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn invalid_status_falls_back_to_500() {
        let response = payload_response(ErrorPayload::new("odd", "provider_unavailable", 42));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn event_stream_response_sets_headers() {
        let (mut channel, frames) = ResponseChannel::open(&Default::default());
        channel.close();

        let response = event_stream_response(frames);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");
    }
}
