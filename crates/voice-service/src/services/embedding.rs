//! Image embedding collaborator.
//!
//! The model itself runs out of process. `HttpImageEmbedder` posts the raw
//! image to an embedding service and expects `{"embedding": [f32, ...]}`
//! back. The vector is checked against the configured dimension and
//! L2-normalised here, so callers always store unit vectors whatever the
//! service returns.

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{instrument, warn};

/// Timeout for one embedding request. Model inference on CPU is slow.
const EMBEDDING_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Turns an image into a fixed-length unit vector.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed(&self, image: Bytes, content_type: &str) -> Result<Vec<f32>, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding service reached over HTTP.
#[derive(Clone)]
pub struct HttpImageEmbedder {
    client: Client,
    url: String,
    dimension: usize,
}

impl HttpImageEmbedder {
    /// Create a client for the service at `url` producing `dimension`-length vectors.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, dimension: usize) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(EMBEDDING_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            dimension,
        })
    }
}

#[async_trait]
impl ImageEmbedder for HttpImageEmbedder {
    #[instrument(skip_all, name = "vs.services.embedding", fields(bytes = image.len()))]
    async fn embed(&self, image: Bytes, content_type: &str) -> Result<Vec<f32>, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "vs.services.embedding", error = %e, "Embedding request failed");
                CollaboratorError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "vs.services.embedding", status = %status, "Embedding service returned error");
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let mut vector = parsed.embedding;
        if vector.len() != self.dimension {
            return Err(CollaboratorError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }
        if !l2_normalize(&mut vector) {
            return Err(CollaboratorError::InvalidResponse(
                "embedding has zero or non-finite norm".to_string(),
            ));
        }
        Ok(vector)
    }
}

/// Scale `vector` to unit length in place.
///
/// Returns `false` (leaving the vector untouched) when the norm is zero
/// or not finite.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        assert!(l2_normalize(&mut v));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        assert!(!l2_normalize(&mut zero));
        assert_eq!(zero, vec![0.0, 0.0]);

        let mut nan = vec![f32::NAN, 1.0];
        assert!(!l2_normalize(&mut nan));
    }

    #[tokio::test]
    async fn test_embed_posts_image_and_normalises() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(header("content-type", "image/png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embedding": [1.0, 2.0, 2.0]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpImageEmbedder::new(format!("{}/embed", server.uri()), 3).unwrap();
        let vector = embedder
            .embed(Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();

        assert_eq!(vector.len(), 3);
        assert!((norm(&vector) - 1.0).abs() < 1e-6);
        assert!((vector[0] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_rejects_wrong_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [1.0]})),
            )
            .mount(&server)
            .await;

        let embedder = HttpImageEmbedder::new(server.uri(), 768).unwrap();
        let result = embedder.embed(Bytes::from_static(b"img"), "image/jpeg").await;

        assert!(matches!(result, Err(CollaboratorError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_embed_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let embedder = HttpImageEmbedder::new(server.uri(), 3).unwrap();
        let result = embedder.embed(Bytes::from_static(b"img"), "image/jpeg").await;

        match result {
            Err(CollaboratorError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "model loading");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let embedder = HttpImageEmbedder::new(server.uri(), 3).unwrap();
        let result = embedder.embed(Bytes::from_static(b"img"), "image/jpeg").await;

        assert!(matches!(result, Err(CollaboratorError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_embed_unreachable_service() {
        // Nothing listens on port 9 (discard) on loopback in test environments.
        let embedder = HttpImageEmbedder::new("http://127.0.0.1:9/embed", 3).unwrap();
        let result = embedder.embed(Bytes::from_static(b"img"), "image/jpeg").await;

        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }
}
