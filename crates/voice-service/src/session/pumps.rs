//! Receive and send pumps.
//!
//! Each pump returns `Some(reason)` when it ends on its own and `None`
//! when it observed cancellation. Every wait inside a pump races the
//! session token, so a cancelled pump returns at its next suspension
//! point instead of finishing a delay or a read.

use super::writer::SessionWriter;
use super::EndReason;
use crate::errors::SessionError;
use crate::notify::NotificationSource;
use crate::observability::metrics;
use crate::sink::AudioSink;
use common::types::SessionId;
use futures::{Sink, Stream, StreamExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use voice_protocol::{decode_inbound, InboundAudioFrame, InboundFrame, OutboundMessage, WireFrame};

/// Text of the reply to a client heartbeat.
pub const HEARTBEAT_REPLY: &str = "alive";

/// Which pump a task ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Receive,
    Send,
}

impl Pump {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Pump::Receive => "receive",
            Pump::Send => "send",
        }
    }
}

/// State both pumps share for one session.
pub(crate) struct SessionShared<W> {
    pub(crate) id: SessionId,
    sink: Arc<dyn AudioSink>,
    pub(crate) writer: SessionWriter<W>,
    echo_audio: bool,
    chunks_stored: AtomicU64,
}

impl<W> SessionShared<W>
where
    W: Sink<WireFrame> + Unpin + Send,
    W::Error: Display,
{
    pub(crate) fn new(
        id: SessionId,
        sink: Arc<dyn AudioSink>,
        writer: SessionWriter<W>,
        echo_audio: bool,
    ) -> Self {
        Self {
            id,
            sink,
            writer,
            echo_audio,
            chunks_stored: AtomicU64::new(0),
        }
    }

    pub(crate) fn chunks_stored(&self) -> u64 {
        self.chunks_stored.load(Ordering::Relaxed)
    }

    /// Persist one chunk and echo it back when enabled.
    ///
    /// A storage failure is reported to the client and is not an error
    /// for the caller; only a failed write is.
    pub(crate) async fn handle_audio(&self, frame: InboundAudioFrame) -> Result<(), SessionError> {
        match self.sink.store(&frame.bytes).await {
            Ok(audio_id) => {
                self.chunks_stored.fetch_add(1, Ordering::Relaxed);
                metrics::record_audio_chunk(true);
                debug!(
                    target: "vs.session",
                    session_id = %self.id,
                    audio_id = %audio_id,
                    bytes = frame.bytes.len(),
                    "Audio chunk stored"
                );
                if self.echo_audio {
                    self.writer.send(&OutboundMessage::audio(frame.bytes)).await?;
                }
                Ok(())
            }
            Err(e) => {
                metrics::record_audio_chunk(false);
                let err = SessionError::from(e);
                warn!(target: "vs.session", session_id = %self.id, error = %err, "Audio chunk not stored");
                self.report(&err).await
            }
        }
    }

    /// Tell the client about a non-fatal problem.
    async fn report(&self, err: &SessionError) -> Result<(), SessionError> {
        self.writer
            .send(&OutboundMessage::error(err.client_message()))
            .await
    }
}

/// Short label for logs; never includes payload contents.
pub(crate) fn inbound_label(frame: &InboundFrame) -> &'static str {
    match frame {
        InboundFrame::Audio(_) => "audio",
        InboundFrame::Disconnect { .. } => "disconnect",
        InboundFrame::Heartbeat => "heartbeat",
        InboundFrame::Keepalive => "keepalive",
        InboundFrame::Malformed(_) => "malformed",
    }
}

/// Map a write result to the pump's next step: fatal errors end the
/// pump, everything else is logged and skipped.
fn check_write(id: SessionId, pump: Pump, result: Result<(), SessionError>) -> Option<EndReason> {
    match result {
        Ok(()) => None,
        Err(err) if err.is_fatal() => {
            debug!(target: "vs.session", session_id = %id, pump = pump.as_str(), error = %err, "Write failed");
            Some(EndReason::WriteFailed)
        }
        Err(err) => {
            warn!(target: "vs.session", session_id = %id, pump = pump.as_str(), error = %err, "Message dropped");
            None
        }
    }
}

/// Read inbound frames until the client leaves, the transport ends, or
/// the session is cancelled.
pub(crate) async fn receive_pump<R, E, W>(
    mut reader: R,
    shared: Arc<SessionShared<W>>,
    cancel: CancellationToken,
) -> Option<EndReason>
where
    R: Stream<Item = Result<WireFrame, E>> + Unpin,
    E: Display,
    W: Sink<WireFrame> + Unpin + Send,
    W::Error: Display,
{
    let id = shared.id;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            next = reader.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(target: "vs.session", session_id = %id, error = %e, "Transport read failed");
                return Some(EndReason::TransportClosed);
            }
            None => {
                debug!(target: "vs.session", session_id = %id, "Transport ended");
                return Some(EndReason::TransportClosed);
            }
        };

        let peer_closed = matches!(frame, WireFrame::Close(_));
        let inbound = decode_inbound(frame);
        trace!(target: "vs.session", session_id = %id, frame = inbound_label(&inbound), "Inbound frame");

        let write = match inbound {
            InboundFrame::Audio(audio) => shared.handle_audio(audio).await,
            InboundFrame::Disconnect { code } => {
                debug!(target: "vs.session", session_id = %id, code = ?code, "Client disconnected");
                return Some(if peer_closed {
                    EndReason::ClientClosed
                } else {
                    EndReason::ClientDisconnected
                });
            }
            InboundFrame::Heartbeat => {
                shared
                    .writer
                    .send(&OutboundMessage::heartbeat(HEARTBEAT_REPLY))
                    .await
            }
            InboundFrame::Keepalive => Ok(()),
            InboundFrame::Malformed(malformed) => {
                metrics::record_malformed_frame();
                let err = SessionError::MalformedFrame(malformed.reason);
                warn!(target: "vs.session", session_id = %id, error = %err, "Ignoring inbound frame");
                shared.report(&err).await
            }
        };

        if let Some(reason) = check_write(id, Pump::Receive, write) {
            // A cancelled writer refuses writes; report that as cancellation.
            return (!cancel.is_cancelled()).then_some(reason);
        }
    }
}

/// Push notifications on the source's schedule until a write fails or
/// the session is cancelled.
pub(crate) async fn send_pump<W>(
    mut source: Box<dyn NotificationSource>,
    shared: Arc<SessionShared<W>>,
    cancel: CancellationToken,
) -> Option<EndReason>
where
    W: Sink<WireFrame> + Unpin + Send,
    W::Error: Display,
{
    let id = shared.id;
    loop {
        let delay = source.delay();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            message = source.next() => message,
        };

        let kind = message.kind();
        let write = shared.writer.send(&message).await;
        if write.is_ok() {
            debug!(target: "vs.session", session_id = %id, kind = kind.as_str(), "Notification sent");
        }
        if let Some(reason) = check_write(id, Pump::Send, write) {
            return (!cancel.is_cancelled()).then_some(reason);
        }
    }
}
