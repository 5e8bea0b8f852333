//! Codec for outbound messages and inbound frames.

use crate::envelope::{OutboundMessage, WireMessage};
use crate::frame::{InboundAudioFrame, InboundFrame, MalformedFrame, WireFrame};
use chrono::Utc;
use serde::Deserialize;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Message could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Text is not a valid outbound envelope
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Text control messages a client may send instead of audio.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Disconnect,
    Heartbeat,
}

/// Encode an outbound message to its JSON text form.
///
/// # Errors
///
/// Returns an error only if serde fails, which does not happen for
/// well-formed messages.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, CodecError> {
    let wire = WireMessage::from(message.clone());
    serde_json::to_string(&wire).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decode an outbound message from JSON text (the client's view).
///
/// # Errors
///
/// Returns an error if the text is not a recognised envelope.
pub fn decode_outbound(text: &str) -> Result<OutboundMessage, CodecError> {
    serde_json::from_str::<WireMessage>(text)
        .map(OutboundMessage::from)
        .map_err(|e| CodecError::InvalidEnvelope(e.to_string()))
}

/// Interpret an inbound transport frame.
///
/// Never fails: frames that do not fit any known shape come back as
/// [`InboundFrame::Malformed`].
#[must_use]
pub fn decode_inbound(frame: WireFrame) -> InboundFrame {
    match frame {
        WireFrame::Binary(bytes) if bytes.is_empty() => InboundFrame::Malformed(MalformedFrame {
            reason: "empty binary frame".to_string(),
        }),
        WireFrame::Binary(bytes) => InboundFrame::Audio(InboundAudioFrame {
            bytes,
            received_at: Utc::now(),
        }),
        WireFrame::Close(close) => InboundFrame::Disconnect {
            code: close.map(|c| c.code),
        },
        WireFrame::Ping(_) | WireFrame::Pong(_) => InboundFrame::Keepalive,
        WireFrame::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage::Disconnect) => InboundFrame::Disconnect { code: None },
            Ok(ControlMessage::Heartbeat) => InboundFrame::Heartbeat,
            Err(e) => InboundFrame::Malformed(MalformedFrame {
                reason: format!("unrecognized text frame: {e}"),
            }),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::frame::CloseFrame;
    use crate::product::ProductRecord;
    use bytes::Bytes;

    fn record(id: &str) -> ProductRecord {
        ProductRecord::new(id, format!("Product {id}"), "Brand", 10.0, "https://x/img.jpg")
    }

    #[test]
    fn test_encode_audio_shape() {
        let text = encode_outbound(&OutboundMessage::audio(vec![0u8, 1, 2])).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["type"], "audio");
        assert_eq!(json["format"], "wav");
        assert_eq!(json["data"], "AAEC");
    }

    #[test]
    fn test_encode_single_shape() {
        let text = encode_outbound(&OutboundMessage::ProductSingle { record: record("1") }).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["type"], "product");
        assert_eq!(json["flag"], "single");
        assert_eq!(json["data"]["id"], "1");
    }

    #[test]
    fn test_encode_comparison_shape() {
        let message = OutboundMessage::ProductComparison {
            record_a: record("1"),
            record_b: record("2"),
            reason: "Price difference detected".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&encode_outbound(&message).unwrap()).unwrap();

        assert_eq!(json["flag"], "comparison");
        assert_eq!(json["data"]["product1"]["id"], "1");
        assert_eq!(json["data"]["product2"]["id"], "2");
        assert_eq!(json["data"]["comparison_reason"], "Price difference detected");
    }

    #[test]
    fn test_encode_similar_shape() {
        let message = OutboundMessage::ProductSimilar {
            main: record("3"),
            candidates: vec![record("6"), record("7")],
            reason: "Same category products".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&encode_outbound(&message).unwrap()).unwrap();

        assert_eq!(json["flag"], "similar");
        assert_eq!(json["data"]["main_product"]["id"], "3");
        assert_eq!(json["data"]["similar_products"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"]["similarity_reason"], "Same category products");
    }

    #[test]
    fn test_audio_payload_survives_decode() {
        let original = Bytes::from_static(b"RIFF\x00\x01\x02\xff");
        let text = encode_outbound(&OutboundMessage::audio(original.clone())).unwrap();

        match decode_outbound(&text).unwrap() {
            OutboundMessage::AudioEcho { bytes, format } => {
                assert_eq!(bytes, original);
                assert_eq!(format, "wav");
            }
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_outbound_product_variants() {
        let similar = OutboundMessage::ProductSimilar {
            main: record("3"),
            candidates: vec![record("6")],
            reason: "Same category products".to_string(),
        };
        let decoded = decode_outbound(&encode_outbound(&similar).unwrap()).unwrap();
        assert_eq!(decoded, similar);

        let error = OutboundMessage::error("audio chunk could not be stored");
        let decoded = decode_outbound(&encode_outbound(&error).unwrap()).unwrap();
        assert_eq!(decoded, error);
    }

    #[test]
    fn test_decode_outbound_rejects_unknown_flag() {
        let result = decode_outbound(r#"{"type":"product","flag":"bundle","data":{}}"#);
        assert!(matches!(result, Err(CodecError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_decode_outbound_rejects_bad_base64() {
        let result = decode_outbound(r#"{"type":"audio","data":"***","format":"wav"}"#);
        assert!(matches!(result, Err(CodecError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_decode_inbound_binary_is_audio() {
        let frame = decode_inbound(WireFrame::Binary(Bytes::from_static(b"chunk")));
        match frame {
            InboundFrame::Audio(audio) => assert_eq!(audio.bytes, Bytes::from_static(b"chunk")),
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_inbound_empty_binary_is_malformed() {
        let frame = decode_inbound(WireFrame::Binary(Bytes::new()));
        assert!(matches!(frame, InboundFrame::Malformed(_)));
    }

    #[test]
    fn test_decode_inbound_close_is_disconnect() {
        let frame = decode_inbound(WireFrame::Close(Some(CloseFrame::new(1000, "bye"))));
        assert_eq!(frame, InboundFrame::Disconnect { code: Some(1000) });

        let frame = decode_inbound(WireFrame::Close(None));
        assert_eq!(frame, InboundFrame::Disconnect { code: None });
    }

    #[test]
    fn test_decode_inbound_text_controls() {
        assert_eq!(
            decode_inbound(WireFrame::Text(r#"{"type":"disconnect"}"#.to_string())),
            InboundFrame::Disconnect { code: None }
        );
        assert_eq!(
            decode_inbound(WireFrame::Text(r#"{"type":"heartbeat"}"#.to_string())),
            InboundFrame::Heartbeat
        );
    }

    #[test]
    fn test_decode_inbound_unknown_text_is_malformed() {
        let frame = decode_inbound(WireFrame::Text("hello".to_string()));
        assert!(matches!(frame, InboundFrame::Malformed(_)));

        let frame = decode_inbound(WireFrame::Text(r#"{"type":"subscribe"}"#.to_string()));
        assert!(matches!(frame, InboundFrame::Malformed(_)));
    }

    #[test]
    fn test_decode_inbound_ping_is_keepalive() {
        assert_eq!(
            decode_inbound(WireFrame::Ping(Bytes::new())),
            InboundFrame::Keepalive
        );
        assert_eq!(
            decode_inbound(WireFrame::Pong(Bytes::new())),
            InboundFrame::Keepalive
        );
    }
}
