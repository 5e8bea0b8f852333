//! Voice service error types.
//!
//! Session errors separate per-frame problems (logged, session continues)
//! from transport and protocol failures (session tears down). Ingestion
//! errors map to HTTP responses via `IntoResponse`; internal details are
//! logged server-side but not exposed to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use voice_protocol::CodecError;

/// Audio persistence failure for one chunk.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed (disk full, permission denied, ...).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Streaming session error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Inbound frame could not be interpreted.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// An audio chunk could not be persisted.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The connection is gone (read or write failed, or peer closed).
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// The first inbound unit was not a binary audio chunk.
    #[error("Unsupported initial frame")]
    UnsupportedInitialFrame,

    /// No inbound unit arrived before the handshake deadline.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// An outbound message could not be encoded. The message is dropped.
    #[error("Encoding failed: {0}")]
    Encode(#[from] CodecError),
}

impl SessionError {
    /// Whether this error ends the session.
    ///
    /// Per-frame and per-chunk errors are contained; transport and
    /// protocol violations escalate to teardown.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            SessionError::MalformedFrame(_)
            | SessionError::Storage(_)
            | SessionError::Encode(_) => false,
            SessionError::TransportClosed(_)
            | SessionError::UnsupportedInitialFrame
            | SessionError::HandshakeTimeout => true,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::MalformedFrame(_) => "unsupported frame ignored".to_string(),
            SessionError::Storage(_) => "audio chunk could not be stored".to_string(),
            SessionError::TransportClosed(_) => "connection closed".to_string(),
            SessionError::UnsupportedInitialFrame => "unsupported data".to_string(),
            SessionError::HandshakeTimeout => "no audio received".to_string(),
            SessionError::Encode(_) => "message could not be delivered".to_string(),
        }
    }
}

/// Failure reported by an ingestion collaborator (embedding service,
/// object storage, catalog store).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Request could not be sent or no response arrived.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Collaborator answered with a non-success status.
    #[error("Collaborator returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response arrived but did not have the expected shape.
    #[error("Invalid collaborator response: {0}")]
    InvalidResponse(String),
}

/// Ingestion pipeline stage, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Embedding,
    Upload,
    Insert,
}

impl IngestStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Embedding => "embedding",
            IngestStage::Upload => "upload",
            IngestStage::Insert => "insert",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog ingestion error.
///
/// Maps to HTTP status codes:
/// - `BadRequest`: 400 Bad Request
/// - `CollaboratorFailure`, `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A collaborator (embedding, storage, catalog) failed.
    ///
    /// `orphaned_object` is set when an upload succeeded, the insert
    /// failed, and the uploaded object could not be removed again.
    #[error("{stage} failed: {detail}")]
    CollaboratorFailure {
        stage: IngestStage,
        detail: String,
        orphaned_object: Option<String>,
    },

    #[error("Internal server error")]
    Internal,
}

impl IngestError {
    /// Collaborator failure without an orphaned object.
    #[must_use]
    pub fn collaborator(stage: IngestStage, detail: impl ToString) -> Self {
        IngestError::CollaboratorFailure {
            stage,
            detail: detail.to_string(),
            orphaned_object: None,
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::BadRequest(_) => 400,
            IngestError::CollaboratorFailure { .. } | IngestError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            IngestError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            IngestError::CollaboratorFailure {
                stage,
                detail,
                orphaned_object,
            } => {
                // Log actual error server-side, return generic message to client
                tracing::error!(
                    target: "vs.ingest",
                    stage = %stage,
                    error = %detail,
                    orphaned_object = ?orphaned_object,
                    "Product ingestion failed"
                );
                let message = match orphaned_object {
                    Some(path) => format!(
                        "Unexpected error: {stage} failed and uploaded image {path} could not be removed"
                    ),
                    None => format!("Unexpected error: {stage} failed"),
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COLLABORATOR_FAILURE",
                    message,
                )
            }
            IngestError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn io_error() -> StorageError {
        StorageError::Io {
            path: PathBuf::from("/tmp/user_audio/x.wav"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
    }

    #[test]
    fn test_session_error_fatality() {
        assert!(!SessionError::MalformedFrame("text".to_string()).is_fatal());
        assert!(!SessionError::Storage(io_error()).is_fatal());
        assert!(SessionError::TransportClosed("reset".to_string()).is_fatal());
        assert!(SessionError::UnsupportedInitialFrame.is_fatal());
        assert!(SessionError::HandshakeTimeout.is_fatal());
        assert!(!SessionError::Encode(CodecError::Serialization("nan".to_string())).is_fatal());
    }

    #[test]
    fn test_session_client_messages_hide_internal_details() {
        let err = SessionError::Storage(io_error());
        assert!(!err.client_message().contains("/tmp"));
        assert_eq!(err.client_message(), "audio chunk could not be stored");
        assert_eq!(
            SessionError::UnsupportedInitialFrame.client_message(),
            "unsupported data"
        );
    }

    #[test]
    fn test_storage_error_converts_to_session_error() {
        let err: SessionError = io_error().into();
        assert!(matches!(err, SessionError::Storage(_)));
    }

    #[test]
    fn test_collaborator_error_becomes_stage_failure() {
        let err = IngestError::collaborator(
            IngestStage::Insert,
            CollaboratorError::Status {
                status: 409,
                body: "duplicate".to_string(),
            },
        );
        assert_eq!(err.to_string(), "insert failed: Collaborator returned 409: duplicate");
    }

    #[test]
    fn test_ingest_status_codes() {
        assert_eq!(IngestError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(
            IngestError::collaborator(IngestStage::Upload, "timeout").status_code(),
            500
        );
        assert_eq!(IngestError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_collaborator_failure_response_hides_detail() {
        let response = IngestError::collaborator(
            IngestStage::Embedding,
            "connection refused at 10.0.0.7:9000",
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "COLLABORATOR_FAILURE");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("embedding"));
        assert!(!message.contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_orphaned_object_is_reported() {
        let response = IngestError::CollaboratorFailure {
            stage: IngestStage::Insert,
            detail: "duplicate key".to_string(),
            orphaned_object: Some("abc.jpg".to_string()),
        }
        .into_response();

        let body = body_json(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("insert failed"));
        assert!(message.contains("abc.jpg"));
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let response = IngestError::BadRequest("missing field: name".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "missing field: name");
    }
}
