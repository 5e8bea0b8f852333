//! Object storage collaborator for product images.
//!
//! `SupabaseStorage` talks to the Supabase Storage REST API with the
//! service-role key. Public URLs are derived locally; the bucket must be
//! configured as public.

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use bytes::Bytes;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Timeout for one storage request.
const STORAGE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Blob store holding uploaded images.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` in `bucket`. Returns the object path
    /// within the bucket.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, CollaboratorError>;

    /// Publicly reachable URL for an uploaded object.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Delete an uploaded object.
    async fn remove(&self, bucket: &str, path: &str) -> Result<(), CollaboratorError>;
}

/// Supabase Storage client.
#[derive(Clone)]
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_key: SecretString,
}

impl SupabaseStorage {
    /// Create a client for the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        service_key: SecretString,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(STORAGE_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        request
            .header("apikey", key)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
    }
}

/// Turn a transport result into a success response or a `CollaboratorError`.
pub(crate) async fn check_response(
    result: Result<Response, reqwest::Error>,
    target: &'static str,
) -> Result<Response, CollaboratorError> {
    let response = result.map_err(|e| {
        warn!(target: "vs.services", collaborator = target, error = %e, "Request failed");
        CollaboratorError::Unavailable(e.to_string())
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(
        target: "vs.services",
        collaborator = target,
        status = %status,
        "Collaborator returned error status"
    );
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    #[instrument(skip_all, name = "vs.services.storage.upload", fields(bucket = %bucket, key = %key))]
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, CollaboratorError> {
        let request = self
            .authorized(self.client.post(self.object_url(bucket, key)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);

        check_response(request.send().await, "storage").await?;
        debug!(target: "vs.services", bucket = %bucket, key = %key, "Object uploaded");
        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    #[instrument(skip_all, name = "vs.services.storage.remove", fields(bucket = %bucket, path = %path))]
    async fn remove(&self, bucket: &str, path: &str) -> Result<(), CollaboratorError> {
        let request = self.authorized(self.client.delete(self.object_url(bucket, path)));
        check_response(request.send().await, "storage").await?;
        debug!(target: "vs.services", bucket = %bucket, path = %path, "Object removed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::new(server.uri(), SecretString::from("service-key")).unwrap()
    }

    #[tokio::test]
    async fn test_upload_sends_credentials_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/product-images/abc.jpg"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("content-type", "image/jpeg"))
            .and(body_bytes(b"jpeg-bytes".to_vec()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Key": "product-images/abc.jpg"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let path = storage(&server)
            .upload(
                "product-images",
                "abc.jpg",
                Bytes::from_static(b"jpeg-bytes"),
                "image/jpeg",
            )
            .await
            .unwrap();

        assert_eq!(path, "abc.jpg");
    }

    #[tokio::test]
    async fn test_upload_conflict_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Duplicate"))
            .mount(&server)
            .await;

        let result = storage(&server)
            .upload("b", "k.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await;

        match result {
            Err(CollaboratorError::Status { status, body }) => {
                assert_eq!(status, 409);
                assert_eq!(body, "Duplicate");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_public_url_shape() {
        let storage =
            SupabaseStorage::new("https://proj.supabase.co/", SecretString::from("k")).unwrap();

        assert_eq!(
            storage.public_url("product-images", "abc.jpg"),
            "https://proj.supabase.co/storage/v1/object/public/product-images/abc.jpg"
        );
    }

    #[tokio::test]
    async fn test_remove_issues_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/product-images/abc.jpg"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        storage(&server)
            .remove("product-images", "abc.jpg")
            .await
            .unwrap();
    }
}
