//! Voice Service Library
//!
//! Backend for a voice shopping client:
//!
//! - A duplex streaming session over WebSocket. The client streams audio
//!   chunks up; the server persists them and pushes audio and product
//!   recommendations down on its own schedule.
//! - Catalog ingestion: `POST /products` embeds an uploaded image,
//!   stores it and inserts the product record.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> session/*.rs  -> sink.rs, notify/*.rs
//!                                -> services/*.rs -> embedding, storage, catalog
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP and WebSocket handlers
//! - `notify` - Notification sources for the send side of a session
//! - `observability` - Health probes and metrics
//! - `routes` - Axum router setup
//! - `services` - Ingestion collaborators
//! - `session` - Duplex session state machine and manager
//! - `sink` - Audio persistence

#![warn(clippy::pedantic)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod notify;
pub mod observability;
pub mod routes;
pub mod services;
pub mod session;
pub mod sink;
