//! `SessionManager` - owns every live session.
//!
//! `handle` builds a [`Session`] for one accepted connection, runs it to
//! `Closed` and returns its report. It never returns an error: whatever
//! happens inside the session ends as an [`EndReason`](super::EndReason) in the report.
//!
//! Each session gets a child of the manager's shutdown token, so
//! `shutdown()` closes all of them (`1001`) at once. The live-session
//! count is held in a watch channel; `wait_idle` lets the binary wait
//! for sessions to drain after shutdown.

use super::{Session, SessionConfig, SessionReport};
use crate::notify::NotificationSourceFactory;
use crate::observability::metrics;
use crate::sink::AudioSink;
use futures::{Sink, Stream};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use voice_protocol::WireFrame;

/// Accepts connections and runs one session per connection.
pub struct SessionManager {
    sink: Arc<dyn AudioSink>,
    sources: Arc<dyn NotificationSourceFactory>,
    config: SessionConfig,
    shutdown: CancellationToken,
    active: watch::Sender<u64>,
    total: AtomicU64,
}

/// Decrements the live count however `handle` exits, including when its
/// future is dropped mid-session.
struct ActiveGuard<'a> {
    active: &'a watch::Sender<u64>,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a watch::Sender<u64>) -> Self {
        active.send_modify(|n| *n += 1);
        metrics::set_active_sessions(*active.borrow());
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::set_active_sessions(*self.active.borrow());
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(
        sink: Arc<dyn AudioSink>,
        sources: Arc<dyn NotificationSourceFactory>,
        config: SessionConfig,
    ) -> Self {
        let (active, _) = watch::channel(0);
        Self {
            sink,
            sources,
            config,
            shutdown: CancellationToken::new(),
            active,
            total: AtomicU64::new(0),
        }
    }

    /// Run one connection to completion.
    pub async fn handle<R, E, W>(&self, reader: R, writer: W) -> SessionReport
    where
        R: Stream<Item = Result<WireFrame, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        W: Sink<WireFrame> + Unpin + Send + 'static,
        W::Error: Display,
    {
        let _active = ActiveGuard::enter(&self.active);
        self.total.fetch_add(1, Ordering::Relaxed);

        let session = Session::new(
            reader,
            writer,
            Arc::clone(&self.sink),
            self.sources.create(),
            self.config.clone(),
            self.shutdown.child_token(),
        );
        debug!(
            target: "vs.session.manager",
            session_id = %session.id(),
            active = *self.active.borrow(),
            "Session started"
        );

        let report = session.run().await;
        metrics::record_session_closed(report.end_reason.as_str(), report.duration);
        report
    }

    /// Close every live session and refuse to keep new ones open.
    pub fn shutdown(&self) {
        info!(
            target: "vs.session.manager",
            active = *self.active.borrow(),
            "Shutting down sessions"
        );
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    #[must_use]
    pub fn active_sessions(&self) -> u64 {
        *self.active.borrow()
    }

    /// Sessions started since creation.
    #[must_use]
    pub fn total_sessions(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Wait until no session is live, up to `timeout`. Returns whether the
    /// manager went idle in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let idle = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .is_ok();
        idle
    }
}
