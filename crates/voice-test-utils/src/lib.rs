//! # Voice Test Utilities
//!
//! Shared test utilities for the voice service.
//!
//! This crate provides:
//! - Server test harness (`TestVoiceServer` for E2E tests)
//! - Stream client (`TestStreamClient`, WebSocket via tokio-tungstenite)
//! - Fixtures (audio chunks, product upload forms)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use voice_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestVoiceServer::spawn().await?;
//!     let mut client = TestStreamClient::connect(&server.ws_url()).await?;
//!
//!     client.send_audio(&audio_chunk(0)).await?;
//!     let echo = client.next_message().await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod stream_client;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use stream_client::*;
