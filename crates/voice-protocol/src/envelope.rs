//! Outbound message variants and their JSON envelope.
//!
//! On the wire every message is a JSON object discriminated by `type`
//! and, for product payloads, by `flag`:
//!
//! ```text
//! {"type":"audio","data":"<base64>","format":"wav"}
//! {"type":"product","flag":"single","data":{...record...}}
//! {"type":"product","flag":"comparison","data":{"product1":..,"product2":..,"comparison_reason":".."}}
//! {"type":"product","flag":"similar","data":{"main_product":..,"similar_products":[..],"similarity_reason":".."}}
//! {"type":"heartbeat","text":".."}
//! {"type":"error","message":".."}
//! ```
//!
//! [`OutboundMessage`] is the flat form the server works with. The nested
//! serde types below exist only to produce and parse that shape.

use crate::product::ProductRecord;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A server-originated message. Exactly one payload kind per message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Audio pushed to the client (echo of a received chunk or a cue).
    AudioEcho { bytes: Bytes, format: String },
    /// A single recommended product.
    ProductSingle { record: ProductRecord },
    /// Two distinct products with the reason they are compared.
    ProductComparison {
        record_a: ProductRecord,
        record_b: ProductRecord,
        reason: String,
    },
    /// A main product and a group of similar candidates.
    ProductSimilar {
        main: ProductRecord,
        candidates: Vec<ProductRecord>,
        reason: String,
    },
    /// Liveness answer to a client heartbeat.
    Heartbeat { text: String },
    /// Non-fatal problem report; the session keeps running.
    Error { message: String },
}

/// Payload kind, used for log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Audio,
    ProductSingle,
    ProductComparison,
    ProductSimilar,
    Heartbeat,
    Error,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Audio => "audio",
            MessageKind::ProductSingle => "product_single",
            MessageKind::ProductComparison => "product_comparison",
            MessageKind::ProductSimilar => "product_similar",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Error => "error",
        }
    }
}

impl OutboundMessage {
    /// Default audio container reported to clients.
    pub const DEFAULT_AUDIO_FORMAT: &'static str = "wav";

    /// Audio message in the default format.
    #[must_use]
    pub fn audio(bytes: impl Into<Bytes>) -> Self {
        OutboundMessage::AudioEcho {
            bytes: bytes.into(),
            format: Self::DEFAULT_AUDIO_FORMAT.to_string(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn heartbeat(text: impl Into<String>) -> Self {
        OutboundMessage::Heartbeat { text: text.into() }
    }

    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            OutboundMessage::AudioEcho { .. } => MessageKind::Audio,
            OutboundMessage::ProductSingle { .. } => MessageKind::ProductSingle,
            OutboundMessage::ProductComparison { .. } => MessageKind::ProductComparison,
            OutboundMessage::ProductSimilar { .. } => MessageKind::ProductSimilar,
            OutboundMessage::Heartbeat { .. } => MessageKind::Heartbeat,
            OutboundMessage::Error { .. } => MessageKind::Error,
        }
    }

    /// True for any of the three product flags.
    #[must_use]
    pub const fn is_product(&self) -> bool {
        matches!(
            self,
            OutboundMessage::ProductSingle { .. }
                | OutboundMessage::ProductComparison { .. }
                | OutboundMessage::ProductSimilar { .. }
        )
    }
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireMessage {
    Audio {
        #[serde(with = "base64_bytes")]
        data: Bytes,
        format: String,
    },
    Product(ProductPayload),
    Heartbeat {
        text: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "flag", content = "data", rename_all = "snake_case")]
pub(crate) enum ProductPayload {
    Single(ProductRecord),
    Comparison {
        product1: ProductRecord,
        product2: ProductRecord,
        comparison_reason: String,
    },
    Similar {
        main_product: ProductRecord,
        similar_products: Vec<ProductRecord>,
        similarity_reason: String,
    },
}

impl From<OutboundMessage> for WireMessage {
    fn from(message: OutboundMessage) -> Self {
        match message {
            OutboundMessage::AudioEcho { bytes, format } => WireMessage::Audio {
                data: bytes,
                format,
            },
            OutboundMessage::ProductSingle { record } => {
                WireMessage::Product(ProductPayload::Single(record))
            }
            OutboundMessage::ProductComparison {
                record_a,
                record_b,
                reason,
            } => WireMessage::Product(ProductPayload::Comparison {
                product1: record_a,
                product2: record_b,
                comparison_reason: reason,
            }),
            OutboundMessage::ProductSimilar {
                main,
                candidates,
                reason,
            } => WireMessage::Product(ProductPayload::Similar {
                main_product: main,
                similar_products: candidates,
                similarity_reason: reason,
            }),
            OutboundMessage::Heartbeat { text } => WireMessage::Heartbeat { text },
            OutboundMessage::Error { message } => WireMessage::Error { message },
        }
    }
}

impl From<WireMessage> for OutboundMessage {
    fn from(wire: WireMessage) -> Self {
        match wire {
            WireMessage::Audio { data, format } => OutboundMessage::AudioEcho {
                bytes: data,
                format,
            },
            WireMessage::Product(ProductPayload::Single(record)) => {
                OutboundMessage::ProductSingle { record }
            }
            WireMessage::Product(ProductPayload::Comparison {
                product1,
                product2,
                comparison_reason,
            }) => OutboundMessage::ProductComparison {
                record_a: product1,
                record_b: product2,
                reason: comparison_reason,
            },
            WireMessage::Product(ProductPayload::Similar {
                main_product,
                similar_products,
                similarity_reason,
            }) => OutboundMessage::ProductSimilar {
                main: main_product,
                candidates: similar_products,
                reason: similarity_reason,
            },
            WireMessage::Heartbeat { text } => OutboundMessage::Heartbeat { text },
            WireMessage::Error { message } => OutboundMessage::Error { message },
        }
    }
}

/// Standard base64 for audio payloads.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
