//! Wire protocol for the voice commerce streaming session.
//!
//! Clients stream binary audio chunks to the server; the server pushes
//! JSON text frames carrying either audio or product recommendations.
//! This crate owns both directions of that envelope and knows nothing
//! about the transport carrying it.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod envelope;
pub mod frame;
pub mod product;

pub use codec::{decode_inbound, decode_outbound, encode_outbound, CodecError};
pub use envelope::{MessageKind, OutboundMessage};
pub use frame::{close_code, CloseFrame, InboundAudioFrame, InboundFrame, MalformedFrame, WireFrame};
pub use product::ProductRecord;
