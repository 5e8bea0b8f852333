//! Notification sources - produce server-originated messages and their timing.
//!
//! The send pump asks its source for a `delay()`, waits that long, then
//! asks for `next()`. The session never looks inside the message, so a
//! real recommendation or TTS pipeline can replace the stub without any
//! protocol change.
//!
//! Each session gets its own source from a [`NotificationSourceFactory`],
//! so sources may keep private state (an RNG, a cursor) without locking.

pub mod catalog;
pub mod cue;
pub mod dummy;

pub use catalog::StubCatalog;
pub use dummy::{DummyNotificationSource, DummySourceFactory, NotificationPolicy};

use async_trait::async_trait;
use std::time::Duration;
use voice_protocol::OutboundMessage;

/// Pluggable producer of outbound notifications.
#[async_trait]
pub trait NotificationSource: Send {
    /// Gap before the next call to [`NotificationSource::next`].
    fn delay(&mut self) -> Duration;

    /// Produce one outbound message.
    async fn next(&mut self) -> OutboundMessage;
}

/// Creates one notification source per session.
pub trait NotificationSourceFactory: Send + Sync {
    fn create(&self) -> Box<dyn NotificationSource>;
}
