//! REST API endpoints for the EventGateway
//!
//! `POST /api/event` decodes one event, stamps it with the server time and
//! the peer address, and hands it to the pipeline. The reply never waits for
//! the event to be persisted.

use crate::config::GatewayConfig;
use crate::error::{codes, ErrorResponse};
use event_pipeline::{Event, IngestHandle, LocalDateTime, PipelineError};
use futures_util::{pin_mut, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, error, warn};
use warp::http::StatusCode;
use warp::hyper::body::{Buf, Bytes};
use warp::reply::Response;
use warp::{Filter, Reply};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Events waiting in the hand-off channel
    pub queue_depth: usize,
}

fn error_reply(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    metrics::counter!("ingest_http_errors_total", 1, "code" => code.to_string());
    warp::reply::with_status(warp::reply::json(&ErrorResponse::new(code, message)), status)
        .into_response()
}

/// Map a failed submission onto the reply sent to the client
fn submit_error_reply(err: PipelineError) -> Response {
    match err {
        PipelineError::EnqueueTimeout(limit) => {
            warn!(timeout_ms = limit.as_millis() as u64, "hand-off channel full, event rejected");
            error_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::BACKPRESSURE,
                "event queue is full, retry later",
            )
        }
        PipelineError::Closed => error_reply(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::SHUTTING_DOWN,
            "server is shutting down",
        ),
        other => {
            error!("failed to enqueue event: {}", other);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL, other.to_string())
        }
    }
}

/// Collect the request body, stopping once it grows past `limit` bytes.
///
/// Works the same for `Content-Length` and chunked bodies.
async fn read_body<S, B>(stream: S, limit: u64) -> Result<Bytes, Response>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    pin_mut!(stream);
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let mut chunk = chunk.map_err(|e| {
            warn!(error = %e, "failed to read request body");
            error_reply(StatusCode::BAD_REQUEST, codes::INVALID_EVENT, format!("unreadable body: {e}"))
        })?;

        if (body.len() + chunk.remaining()) as u64 > limit {
            return Err(error_reply(
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {limit} bytes"),
            ));
        }

        while chunk.has_remaining() {
            let part = chunk.chunk();
            let len = part.len();
            body.extend_from_slice(part);
            chunk.advance(len);
        }
    }

    Ok(Bytes::from(body))
}

/// Accept one event
pub async fn submit_event(
    body: Bytes,
    peer: Option<SocketAddr>,
    ingest: IngestHandle,
) -> Result<Response, warp::Rejection> {
    let event = match Event::from_json(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(peer = ?peer, error = %e, "rejected malformed event");
            return Ok(error_reply(StatusCode::BAD_REQUEST, codes::INVALID_EVENT, e.to_string()));
        }
    };

    let event = event.enrich(peer, LocalDateTime::now());
    debug!(device_id = %event.device_id, event = %event.event, sequence = event.sequence, "event accepted");

    match ingest.submit(event).await {
        Ok(()) => Ok(warp::reply::with_status(warp::reply(), StatusCode::ACCEPTED).into_response()),
        Err(e) => Ok(submit_error_reply(e)),
    }
}

/// Accept one event from a raw request body
pub async fn receive_event<S, B>(
    stream: S,
    peer: Option<SocketAddr>,
    ingest: IngestHandle,
    max_body_bytes: u64,
) -> Result<Response, warp::Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    match read_body(stream, max_body_bytes).await {
        Ok(body) => submit_event(body, peer, ingest).await,
        Err(reply) => Ok(reply),
    }
}

/// Report liveness and queue depth
pub fn health_status(ingest: &IngestHandle) -> HealthResponse {
    let status = if ingest.is_closed() { "shutting_down" } else { "healthy" };

    HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        queue_depth: ingest.queue_depth(),
    }
}

/// Create REST API routes
pub fn create_routes(
    ingest: IngestHandle,
    config: &GatewayConfig,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ingest_filter = warp::any().map(move || ingest.clone());
    let max_body_bytes = config.max_body_bytes;

    // Event ingestion endpoint
    let event = warp::path("api")
        .and(warp::path("event"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::stream())
        .and(warp::addr::remote())
        .and(ingest_filter.clone())
        .and(warp::any().map(move || max_body_bytes))
        .and_then(receive_event);

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(ingest_filter)
        .map(|ingest: IngestHandle| warp::reply::json(&health_status(&ingest)));

    event.or(health)
}
