//! `GET /ws/products` - upgrades to a duplex streaming session.
//!
//! The socket is split and each half is mapped to and from
//! [`WireFrame`], so the session never sees axum types.

use crate::routes::AppState;
use axum::extract::ws::{CloseFrame as WsCloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use voice_protocol::{CloseFrame, WireFrame};

/// Handler for GET /ws/products
///
/// # Response
///
/// - 101 Switching Protocols: session started
/// - 503 Service Unavailable: server is shutting down
#[instrument(skip_all, name = "vs.handlers.ws")]
pub async fn products_stream(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.manager.is_shutting_down() {
        warn!(target: "vs.handlers.ws", "Refusing stream, shutting down");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| run_socket(state, socket))
}

async fn run_socket(state: Arc<AppState>, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let reader = stream.map(|item| item.map(from_message));
    let writer = sink.with(to_message);

    let report = state.manager.handle(reader, writer).await;
    info!(
        target: "vs.handlers.ws",
        session_id = %report.id,
        end_reason = %report.end_reason,
        chunks_stored = report.chunks_stored,
        messages_sent = report.messages_sent,
        duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        "Stream finished"
    );
}

/// Map an axum message to a transport-neutral frame.
#[must_use]
pub fn from_message(message: Message) -> WireFrame {
    match message {
        Message::Binary(bytes) => WireFrame::Binary(bytes.into()),
        Message::Text(text) => WireFrame::Text(text),
        Message::Ping(bytes) => WireFrame::Ping(bytes.into()),
        Message::Pong(bytes) => WireFrame::Pong(bytes.into()),
        Message::Close(frame) => WireFrame::Close(
            frame.map(|f| CloseFrame::new(f.code, f.reason.into_owned())),
        ),
    }
}

fn to_message(frame: WireFrame) -> future::Ready<Result<Message, axum::Error>> {
    let message = match frame {
        WireFrame::Binary(bytes) => Message::Binary(bytes.into()),
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Ping(bytes) => Message::Ping(bytes.into()),
        WireFrame::Pong(bytes) => Message::Pong(bytes.into()),
        WireFrame::Close(frame) => Message::Close(frame.map(|f| WsCloseFrame {
            code: f.code,
            reason: f.reason.into(),
        })),
    };
    future::ready(Ok(message))
}
