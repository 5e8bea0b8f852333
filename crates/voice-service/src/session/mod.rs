//! Duplex streaming session.
//!
//! One `Session` owns one connection from accept to release:
//!
//! 1. **Handshake**: the first inbound frame must be a binary audio chunk
//!    and must arrive within `handshake_timeout`. Anything else closes the
//!    connection (`1003` for a non-audio frame) before any pump runs and
//!    without a single outbound message.
//! 2. **Active**: a receive pump (inbound audio to the sink) and a send
//!    pump (notifications from the source) run as tasks in a `JoinSet`
//!    and share one `CancellationToken`, a child of the manager's
//!    shutdown token. Each pump holds a drop guard of that token, so any
//!    exit, panics included, cancels its sibling.
//! 3. **Draining**: after the first pump exits the sibling gets
//!    `cancel_grace` to notice the token, then it is aborted.
//! 4. **Closed**: the close frame (if any) is written, the sink half is
//!    closed and a [`SessionReport`] is returned.

pub mod manager;
pub mod pumps;
pub mod state;
pub mod writer;

pub use manager::SessionManager;
pub use state::{InvalidTransition, SessionState, StateTracker};
pub use writer::SessionWriter;

use crate::config::Config;
use crate::notify::NotificationSource;
use crate::sink::AudioSink;
use common::types::SessionId;
use futures::{Sink, Stream, StreamExt};
use pumps::{receive_pump, send_pump, Pump, SessionShared};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use voice_protocol::{
    close_code, decode_inbound, CloseFrame, InboundAudioFrame, InboundFrame, WireFrame,
};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Client sent a close frame.
    ClientClosed,
    /// Client sent a `disconnect` control message.
    ClientDisconnected,
    /// The inbound stream ended or failed without a close frame.
    TransportClosed,
    /// An outbound write failed.
    WriteFailed,
    /// The server is shutting down.
    Shutdown,
    /// The first inbound frame was not audio.
    UnsupportedInitialFrame,
    /// No inbound frame arrived before the handshake deadline.
    HandshakeTimeout,
    /// A pump task panicked.
    PumpFailed,
}

impl EndReason {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::ClientClosed => "client_closed",
            EndReason::ClientDisconnected => "client_disconnected",
            EndReason::TransportClosed => "transport_closed",
            EndReason::WriteFailed => "write_failed",
            EndReason::Shutdown => "shutdown",
            EndReason::UnsupportedInitialFrame => "unsupported_initial_frame",
            EndReason::HandshakeTimeout => "handshake_timeout",
            EndReason::PumpFailed => "pump_failed",
        }
    }

    /// Close frame to send, or `None` when the transport is already gone
    /// or the peer started the closing handshake itself.
    #[must_use]
    pub fn close_frame(&self) -> Option<CloseFrame> {
        match self {
            EndReason::ClientClosed | EndReason::TransportClosed | EndReason::WriteFailed => None,
            EndReason::ClientDisconnected => {
                Some(CloseFrame::new(close_code::NORMAL, "client disconnected"))
            }
            EndReason::Shutdown => Some(CloseFrame::new(
                close_code::GOING_AWAY,
                "server shutting down",
            )),
            EndReason::UnsupportedInitialFrame => Some(CloseFrame::unsupported_data()),
            EndReason::HandshakeTimeout => Some(CloseFrame::new(
                close_code::POLICY_VIOLATION,
                "no audio received",
            )),
            EndReason::PumpFailed => {
                Some(CloseFrame::new(close_code::INTERNAL_ERROR, "internal error"))
            }
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Echo each stored chunk back as an `audio` message.
    pub echo_audio: bool,
    /// Deadline for the first inbound frame.
    pub handshake_timeout: Duration,
    /// Time the surviving pump gets to stop before it is aborted.
    pub cancel_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            echo_audio: true,
            handshake_timeout: Duration::from_secs(30),
            cancel_grace: Duration::from_millis(250),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            echo_audio: config.echo_audio,
            handshake_timeout: config.handshake_timeout,
            cancel_grace: config.cancel_grace,
        }
    }
}

/// Summary returned when a session reaches `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: SessionId,
    pub end_reason: EndReason,
    pub chunks_stored: u64,
    pub messages_sent: u64,
    pub duration: Duration,
}

/// One connection's lifetime.
pub struct Session<R, W> {
    id: SessionId,
    reader: R,
    shared: Arc<SessionShared<W>>,
    source: Box<dyn NotificationSource>,
    config: SessionConfig,
    cancel: CancellationToken,
    state: Arc<StateTracker>,
}

impl<R, E, W> Session<R, W>
where
    R: Stream<Item = Result<WireFrame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    W: Sink<WireFrame> + Unpin + Send + 'static,
    W::Error: Display,
{
    /// Build a session over a split connection.
    ///
    /// `cancel` ends the session from outside (server shutdown); the
    /// session also cancels it itself when a pump exits.
    pub fn new(
        reader: R,
        writer: W,
        sink: Arc<dyn AudioSink>,
        source: Box<dyn NotificationSource>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let id = SessionId::new();
        let writer = SessionWriter::new(writer, cancel.clone());
        Self {
            id,
            reader,
            shared: Arc::new(SessionShared::new(id, sink, writer, config.echo_audio)),
            source,
            config,
            cancel,
            state: Arc::new(StateTracker::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Shared handle on the lifecycle state, usable after `run` consumed
    /// the session.
    #[must_use]
    pub fn state(&self) -> Arc<StateTracker> {
        Arc::clone(&self.state)
    }

    /// Run the session to `Closed`.
    #[instrument(skip_all, name = "vs.session", fields(session_id = %self.id))]
    pub async fn run(self) -> SessionReport {
        let started = Instant::now();
        let Session {
            id,
            mut reader,
            shared,
            source,
            config,
            cancel,
            state,
        } = self;

        debug!(target: "vs.session", session_id = %id, "Session accepted");

        let end_reason = match handshake(&mut reader, config.handshake_timeout, &cancel).await {
            Ok(first) => {
                advance(&state, id, SessionState::Active);
                info!(target: "vs.session", session_id = %id, "Session active");
                match shared.handle_audio(first).await {
                    Err(err) if err.is_fatal() => {
                        advance(&state, id, SessionState::Draining);
                        if cancel.is_cancelled() {
                            EndReason::Shutdown
                        } else {
                            EndReason::WriteFailed
                        }
                    }
                    _ => {
                        run_pumps(
                            reader,
                            source,
                            Arc::clone(&shared),
                            &config,
                            &cancel,
                            &state,
                        )
                        .await
                    }
                }
            }
            Err(reason) => {
                warn!(target: "vs.session", session_id = %id, reason = %reason, "Handshake rejected");
                drop(reader);
                reason
            }
        };

        shared.writer.close(end_reason.close_frame()).await;
        cancel.cancel();
        advance(&state, id, SessionState::Closed);

        let report = SessionReport {
            id,
            end_reason,
            chunks_stored: shared.chunks_stored(),
            messages_sent: shared.writer.messages_sent(),
            duration: started.elapsed(),
        };

        info!(
            target: "vs.session",
            session_id = %id,
            end_reason = %report.end_reason,
            chunks_stored = report.chunks_stored,
            messages_sent = report.messages_sent,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Session closed"
        );

        report
    }
}

/// Apply a lifecycle transition, logging it when the table rejects it.
fn advance(state: &StateTracker, id: SessionId, next: SessionState) -> bool {
    match state.advance(next) {
        Ok(()) => true,
        Err(e) => {
            debug!(target: "vs.session", session_id = %id, error = %e, "Transition rejected");
            false
        }
    }
}

/// Wait for the first data frame and accept it only if it is audio.
///
/// Transport pings and pongs are skipped; the timeout covers the whole wait.
async fn handshake<R, E>(
    reader: &mut R,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<InboundAudioFrame, EndReason>
where
    R: Stream<Item = Result<WireFrame, E>> + Unpin,
    E: Display,
{
    let deadline = Instant::now() + timeout;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EndReason::Shutdown),
            next = tokio::time::timeout_at(deadline, reader.next()) => next,
        };

        let frame = match next {
            Err(_elapsed) => return Err(EndReason::HandshakeTimeout),
            Ok(None) => return Err(EndReason::TransportClosed),
            Ok(Some(Err(e))) => {
                debug!(target: "vs.session", error = %e, "Transport failed during handshake");
                return Err(EndReason::TransportClosed);
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match decode_inbound(frame) {
            InboundFrame::Audio(audio) => return Ok(audio),
            InboundFrame::Keepalive => {}
            other => {
                debug!(
                    target: "vs.session",
                    frame = pumps::inbound_label(&other),
                    "First frame is not audio"
                );
                return Err(EndReason::UnsupportedInitialFrame);
            }
        }
    }
}

/// Run both pumps until the first one exits, then cancel and reap the other.
async fn run_pumps<R, E, W>(
    reader: R,
    source: Box<dyn NotificationSource>,
    shared: Arc<SessionShared<W>>,
    config: &SessionConfig,
    cancel: &CancellationToken,
    state: &StateTracker,
) -> EndReason
where
    R: Stream<Item = Result<WireFrame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    W: Sink<WireFrame> + Unpin + Send + 'static,
    W::Error: Display,
{
    let id = shared.id;
    let mut pumps = JoinSet::new();

    let token = cancel.clone();
    let receive_shared = Arc::clone(&shared);
    pumps.spawn(async move {
        let _guard = token.clone().drop_guard();
        (Pump::Receive, receive_pump(reader, receive_shared, token).await)
    });

    let token = cancel.clone();
    pumps.spawn(async move {
        let _guard = token.clone().drop_guard();
        (Pump::Send, send_pump(source, shared, token).await)
    });

    let first = pumps.join_next().await;
    advance(state, id, SessionState::Draining);
    cancel.cancel();

    let end_reason = match first {
        Some(Ok((pump, Some(reason)))) => {
            debug!(target: "vs.session", session_id = %id, pump = pump.as_str(), reason = %reason, "Pump exited");
            reason
        }
        Some(Ok((_, None))) => EndReason::Shutdown,
        Some(Err(e)) => {
            error!(target: "vs.session", session_id = %id, error = %e, "Pump task failed");
            EndReason::PumpFailed
        }
        None => EndReason::PumpFailed,
    };

    match tokio::time::timeout(config.cancel_grace, pumps.join_next()).await {
        Ok(Some(Err(e))) if !e.is_cancelled() => {
            error!(target: "vs.session", session_id = %id, error = %e, "Pump task failed while draining");
        }
        Ok(_) => {}
        Err(_) => {
            warn!(
                target: "vs.session",
                session_id = %id,
                grace_ms = u64::try_from(config.cancel_grace.as_millis()).unwrap_or(u64::MAX),
                "Pump did not stop within grace period, aborting"
            );
            pumps.abort_all();
        }
    }
    while pumps.join_next().await.is_some() {}

    end_reason
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::sink::FsAudioSink;
    use async_trait::async_trait;
    use bytes::Bytes;
    use common::types::AudioId;
    use futures::channel::mpsc;
    use std::convert::Infallible;
    use voice_protocol::{decode_outbound, OutboundMessage};

    type Inbound = mpsc::UnboundedSender<Result<WireFrame, Infallible>>;
    type Outbound = mpsc::UnboundedReceiver<WireFrame>;

    /// Fixed-delay source that counts how often it was polled.
    struct Every {
        delay: Duration,
        produced: Arc<std::sync::atomic::AtomicU64>,
    }

    #[async_trait]
    impl NotificationSource for Every {
        fn delay(&mut self) -> Duration {
            self.delay
        }

        async fn next(&mut self) -> OutboundMessage {
            self.produced
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            OutboundMessage::heartbeat("notification")
        }
    }

    /// Source whose `next` never completes.
    struct Stuck;

    #[async_trait]
    impl NotificationSource for Stuck {
        fn delay(&mut self) -> Duration {
            Duration::ZERO
        }

        async fn next(&mut self) -> OutboundMessage {
            futures::future::pending().await
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AudioSink for FailingSink {
        async fn store(&self, _bytes: &[u8]) -> Result<AudioId, StorageError> {
            Err(StorageError::Io {
                path: "/full".into(),
                source: std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
            })
        }
    }

    struct Harness {
        inbound: Inbound,
        outbound: Outbound,
        cancel: CancellationToken,
        state: Arc<StateTracker>,
        handle: tokio::task::JoinHandle<SessionReport>,
    }

    fn start(
        sink: Arc<dyn AudioSink>,
        source: Box<dyn NotificationSource>,
        config: SessionConfig,
    ) -> Harness {
        let (inbound, reader) = mpsc::unbounded();
        let (writer, outbound) = mpsc::unbounded();
        let cancel = CancellationToken::new();
        let session = Session::new(reader, writer, sink, source, config, cancel.clone());
        let state = session.state();
        Harness {
            inbound,
            outbound,
            cancel,
            state,
            handle: tokio::spawn(session.run()),
        }
    }

    fn quiet_source() -> Box<dyn NotificationSource> {
        Box::new(Every {
            delay: Duration::from_secs(3600),
            produced: Arc::default(),
        })
    }

    fn binary(bytes: &'static [u8]) -> Result<WireFrame, Infallible> {
        Ok(WireFrame::Binary(Bytes::from_static(bytes)))
    }

    async fn collect(outbound: Outbound) -> (Vec<OutboundMessage>, Option<CloseFrame>) {
        let frames: Vec<WireFrame> = outbound.collect().await;
        let mut messages = Vec::new();
        let mut close = None;
        for frame in frames {
            match frame {
                WireFrame::Text(text) => messages.push(decode_outbound(&text).unwrap()),
                WireFrame::Close(frame) => close = frame,
                other => panic!("unexpected outbound frame {other:?}"),
            }
        }
        (messages, close)
    }

    #[tokio::test]
    async fn test_non_binary_first_frame_closes_with_unsupported_data() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig::default(),
        );

        h.inbound
            .unbounded_send(Ok(WireFrame::Text("hello".to_string())))
            .unwrap();
        let report = h.handle.await.unwrap();
        let (messages, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::UnsupportedInitialFrame);
        assert!(messages.is_empty(), "no outbound messages expected");
        assert_eq!(close, Some(CloseFrame::unsupported_data()));
        assert_eq!(report.messages_sent, 0);
        assert_eq!(
            h.state.history(),
            vec![SessionState::Handshaking, SessionState::Closed]
        );
        assert!(!dir.path().exists() || std::fs::read_dir(dir.path()).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn test_three_chunks_then_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FsAudioSink::new(dir.path()));
        let produced = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let h = start(
            sink.clone(),
            Box::new(Every {
                delay: Duration::from_secs(3600),
                produced: Arc::clone(&produced),
            }),
            SessionConfig::default(),
        );

        h.inbound.unbounded_send(binary(b"chunk-1")).unwrap();
        h.inbound.unbounded_send(binary(b"chunk-2")).unwrap();
        h.inbound.unbounded_send(binary(b"chunk-3")).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Text(r#"{"type":"disconnect"}"#.to_string())))
            .unwrap();

        let report = h.handle.await.unwrap();

        assert_eq!(
            h.state.history(),
            vec![
                SessionState::Handshaking,
                SessionState::Active,
                SessionState::Draining,
                SessionState::Closed,
            ]
        );
        assert_eq!(report.end_reason, EndReason::ClientDisconnected);
        assert_eq!(report.chunks_stored, 3);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 3);
        let contents: Vec<Vec<u8>> = names
            .iter()
            .map(|n| std::fs::read(dir.path().join(n)).unwrap())
            .collect();
        assert_eq!(
            contents,
            vec![b"chunk-1".to_vec(), b"chunk-2".to_vec(), b"chunk-3".to_vec()]
        );

        let (messages, close) = collect(h.outbound).await;
        assert_eq!(messages.len(), 3);
        assert_eq!(
            close,
            Some(CloseFrame::new(close_code::NORMAL, "client disconnected"))
        );
        assert_eq!(produced.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_echo_matches_received_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig::default(),
        );
        let payload: &'static [u8] = b"RIFF\x24\x00\x00\x00WAVEfmt audio";

        h.inbound.unbounded_send(binary(payload)).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Close(Some(CloseFrame::new(
                close_code::NORMAL,
                "",
            )))))
            .unwrap();
        let report = h.handle.await.unwrap();
        let (messages, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::ClientClosed);
        assert_eq!(close, None);
        match &messages[..] {
            [OutboundMessage::AudioEcho { bytes, format }] => {
                assert_eq!(bytes.as_ref(), payload);
                assert_eq!(format, "wav");
            }
            other => panic!("expected one echo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_echo_disabled_sends_nothing_back() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig {
                echo_audio: false,
                ..SessionConfig::default()
            },
        );

        h.inbound.unbounded_send(binary(b"a")).unwrap();
        drop(h.inbound);
        let report = h.handle.await.unwrap();
        let (messages, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::TransportClosed);
        assert_eq!(report.chunks_stored, 1);
        assert!(messages.is_empty());
        assert_eq!(close, None);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_session_alive() {
        let h = start(Arc::new(FailingSink), quiet_source(), SessionConfig::default());

        h.inbound.unbounded_send(binary(b"first")).unwrap();
        h.inbound.unbounded_send(binary(b"second")).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Text(r#"{"type":"heartbeat"}"#.to_string())))
            .unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Text(r#"{"type":"disconnect"}"#.to_string())))
            .unwrap();
        let report = h.handle.await.unwrap();
        let (messages, _) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::ClientDisconnected);
        assert_eq!(report.chunks_stored, 0);
        assert_eq!(
            messages,
            vec![
                OutboundMessage::error("audio chunk could not be stored"),
                OutboundMessage::error("audio chunk could not be stored"),
                OutboundMessage::heartbeat("alive"),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig {
                echo_audio: false,
                ..SessionConfig::default()
            },
        );

        h.inbound.unbounded_send(binary(b"first")).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Text("{not json".to_string())))
            .unwrap();
        h.inbound.unbounded_send(binary(b"second")).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Close(None)))
            .unwrap();
        let report = h.handle.await.unwrap();
        let (messages, _) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::ClientClosed);
        assert_eq!(report.chunks_stored, 2);
        assert_eq!(
            messages,
            vec![OutboundMessage::error("unsupported frame ignored")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_pump_stops_after_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let produced = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            Box::new(Every {
                delay: Duration::from_secs(2),
                produced: Arc::clone(&produced),
            }),
            SessionConfig {
                echo_audio: false,
                ..SessionConfig::default()
            },
        );

        h.inbound.unbounded_send(binary(b"go")).unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(produced.load(std::sync::atomic::Ordering::SeqCst), 2);

        let disconnected_at = Instant::now();
        drop(h.inbound);
        let report = h.handle.await.unwrap();

        // Closed without waiting for the next notification.
        assert!(Instant::now() - disconnected_at < Duration::from_secs(2));
        assert_eq!(report.end_reason, EndReason::TransportClosed);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(produced.load(std::sync::atomic::Ordering::SeqCst), 2);
        let (messages, _) = collect(h.outbound).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(report.messages_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_arrive_on_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let produced = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            Box::new(Every {
                delay: Duration::from_secs(2),
                produced: Arc::clone(&produced),
            }),
            SessionConfig {
                echo_audio: false,
                ..SessionConfig::default()
            },
        );

        h.inbound.unbounded_send(binary(b"go")).unwrap();
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        h.cancel.cancel();
        let report = h.handle.await.unwrap();

        assert_eq!(report.end_reason, EndReason::Shutdown);
        let mut texts = 0;
        while let Ok(Some(frame)) = h.outbound.try_next() {
            if let WireFrame::Close(close) = frame {
                assert_eq!(close.map(|c| c.code), Some(close_code::GOING_AWAY));
            } else {
                texts += 1;
            }
        }
        assert_eq!(texts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig {
                handshake_timeout: Duration::from_secs(5),
                ..SessionConfig::default()
            },
        );

        let report = h.handle.await.unwrap();
        let (messages, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::HandshakeTimeout);
        assert!(messages.is_empty());
        assert_eq!(close.map(|c| c.code), Some(close_code::POLICY_VIOLATION));
        drop(h.inbound);
    }

    #[tokio::test]
    async fn test_keepalive_before_first_audio_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig::default(),
        );

        h.inbound
            .unbounded_send(Ok(WireFrame::Ping(Bytes::from_static(b"p"))))
            .unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Pong(Bytes::new())))
            .unwrap();
        h.inbound.unbounded_send(binary(b"chunk-1")).unwrap();
        h.inbound
            .unbounded_send(Ok(WireFrame::Text(r#"{"type":"disconnect"}"#.to_string())))
            .unwrap();

        let report = h.handle.await.unwrap();
        let (_, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::ClientDisconnected);
        assert_eq!(report.chunks_stored, 1);
        assert_eq!(close.map(|c| c.code), Some(close_code::NORMAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalives_do_not_extend_handshake_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig {
                handshake_timeout: Duration::from_secs(5),
                ..SessionConfig::default()
            },
        );

        let inbound = h.inbound.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if inbound
                    .unbounded_send(Ok(WireFrame::Ping(Bytes::new())))
                    .is_err()
                {
                    break;
                }
            }
        });

        let report = h.handle.await.unwrap();

        assert_eq!(report.end_reason, EndReason::HandshakeTimeout);
        drop(h.inbound);
    }

    #[test]
    fn test_rejected_transition_leaves_state_unchanged() {
        let state = StateTracker::new();
        let id = SessionId::new();

        assert!(advance(&state, id, SessionState::Closed));
        assert!(!advance(&state, id, SessionState::Active));
        assert_eq!(state.current(), SessionState::Closed);
        assert_eq!(
            state.history(),
            vec![SessionState::Handshaking, SessionState::Closed]
        );
    }

    #[tokio::test]
    async fn test_shutdown_during_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            quiet_source(),
            SessionConfig::default(),
        );

        h.cancel.cancel();
        let report = h.handle.await.unwrap();
        let (messages, close) = collect(h.outbound).await;

        assert_eq!(report.end_reason, EndReason::Shutdown);
        assert!(messages.is_empty());
        assert_eq!(close.map(|c| c.code), Some(close_code::GOING_AWAY));
        drop(h.inbound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_source_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(
            Arc::new(FsAudioSink::new(dir.path())),
            Box::new(Stuck),
            SessionConfig {
                echo_audio: false,
                ..SessionConfig::default()
            },
        );

        h.inbound.unbounded_send(binary(b"go")).unwrap();
        h.inbound.unbounded_send(Ok(WireFrame::Close(None))).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), h.handle)
            .await
            .expect("session should close despite a stuck source")
            .unwrap();

        assert_eq!(report.end_reason, EndReason::ClientClosed);
    }

    #[test]
    fn test_close_frames_per_reason() {
        assert_eq!(EndReason::ClientClosed.close_frame(), None);
        assert_eq!(EndReason::TransportClosed.close_frame(), None);
        assert_eq!(EndReason::WriteFailed.close_frame(), None);
        assert_eq!(
            EndReason::UnsupportedInitialFrame.close_frame(),
            Some(CloseFrame::unsupported_data())
        );
        assert_eq!(
            EndReason::Shutdown.close_frame().map(|c| c.code),
            Some(close_code::GOING_AWAY)
        );
        assert_eq!(
            EndReason::PumpFailed.close_frame().map(|c| c.code),
            Some(close_code::INTERNAL_ERROR)
        );
    }
}
