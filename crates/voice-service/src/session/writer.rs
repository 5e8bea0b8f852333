//! Serialized outbound half of a session's connection.
//!
//! Both pumps write through one `SessionWriter`. The sink sits behind an
//! async mutex, so each frame is handed to the transport whole before
//! the next write starts. Once the session token is cancelled or `close`
//! has run, every later `send` fails without touching the transport:
//! nothing but the close frame reaches the client after teardown starts.

use crate::errors::SessionError;
use crate::observability::metrics;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use voice_protocol::{encode_outbound, CloseFrame, OutboundMessage, WireFrame};

struct WriterInner<W> {
    sink: W,
    closed: bool,
}

/// Mutex-guarded sink shared by the receive and send pumps.
pub struct SessionWriter<W> {
    inner: Mutex<WriterInner<W>>,
    cancel: CancellationToken,
    sent: AtomicU64,
}

impl<W> SessionWriter<W>
where
    W: Sink<WireFrame> + Unpin + Send,
    W::Error: Display,
{
    /// Wrap `sink`; writes stop being accepted once `cancel` fires.
    #[must_use]
    pub fn new(sink: W, cancel: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(WriterInner {
                sink,
                closed: false,
            }),
            cancel,
            sent: AtomicU64::new(0),
        }
    }

    /// Encode and write one message as a text frame.
    ///
    /// Encoding failures are non-fatal (`SessionError::Encode`); transport
    /// failures and writes after cancellation or `close` are
    /// `TransportClosed`.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        let text = encode_outbound(message)?;

        let mut inner = self.inner.lock().await;
        if inner.closed || self.cancel.is_cancelled() {
            return Err(SessionError::TransportClosed("writer closed".to_string()));
        }
        inner
            .sink
            .send(WireFrame::Text(text))
            .await
            .map_err(|e| SessionError::TransportClosed(e.to_string()))?;
        drop(inner);

        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::record_message_sent(message.kind());
        trace!(target: "vs.session.writer", kind = message.kind().as_str(), "Message written");
        Ok(())
    }

    /// Stop accepting messages, optionally send a close frame, and close
    /// the sink. Idempotent.
    pub async fn close(&self, frame: Option<CloseFrame>) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;

        if let Some(frame) = frame {
            let code = frame.code;
            if let Err(e) = inner.sink.send(WireFrame::Close(Some(frame))).await {
                debug!(target: "vs.session.writer", code, error = %e, "Close frame not delivered");
            }
        }
        if let Err(e) = inner.sink.close().await {
            debug!(target: "vs.session.writer", error = %e, "Sink close failed");
        }
    }

    /// Outbound messages successfully written so far.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}
