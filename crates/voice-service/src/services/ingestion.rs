//! Product ingestion pipeline.
//!
//! `create_product` runs embed, upload, public URL, insert, in that
//! order. A failed insert leaves an uploaded image behind, so it is
//! removed again; if that removal fails too the error carries the
//! orphaned object path.

use super::catalog_store::{CatalogStore, NewProduct, StoredProduct};
use super::embedding::ImageEmbedder;
use super::object_storage::ObjectStorage;
use crate::errors::{IngestError, IngestStage};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Content type stored with every uploaded image. Keys always end in `.jpg`.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Validated form input for one product.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub image: Bytes,
    /// Content type the client declared for the image part.
    pub image_content_type: String,
}

impl ProductDraft {
    /// Reject drafts the catalog would not accept.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::BadRequest` naming the offending field.
    pub fn validate(&self) -> Result<(), IngestError> {
        for (field, value) in [
            ("name", &self.name),
            ("brand", &self.brand),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(IngestError::BadRequest(format!("{field} must not be empty")));
            }
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(IngestError::BadRequest(format!(
                "price must be a non-negative number, got {}",
                self.price
            )));
        }
        if self.image.is_empty() {
            return Err(IngestError::BadRequest("image must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Creates catalog products from uploaded images.
#[derive(Clone)]
pub struct IngestionService {
    embedder: Arc<dyn ImageEmbedder>,
    storage: Arc<dyn ObjectStorage>,
    catalog: Arc<dyn CatalogStore>,
    bucket: String,
}

impl IngestionService {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn ImageEmbedder>,
        storage: Arc<dyn ObjectStorage>,
        catalog: Arc<dyn CatalogStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            storage,
            catalog,
            bucket: bucket.into(),
        }
    }

    /// Embed, store and insert one product.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an invalid draft, `CollaboratorFailure` naming the
    /// first stage that failed.
    #[instrument(skip_all, name = "vs.ingest.create_product", fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<StoredProduct, IngestError> {
        draft.validate()?;

        let embedding = self
            .embedder
            .embed(draft.image.clone(), &draft.image_content_type)
            .await
            .map_err(|e| IngestError::collaborator(IngestStage::Embedding, e))?;

        let key = format!("{}.jpg", Uuid::new_v4());
        let path = self
            .storage
            .upload(&self.bucket, &key, draft.image, IMAGE_CONTENT_TYPE)
            .await
            .map_err(|e| IngestError::collaborator(IngestStage::Upload, e))?;
        let image_url = self.storage.public_url(&self.bucket, &path);

        let product = NewProduct {
            name: draft.name,
            brand: draft.brand,
            category: draft.category,
            price: draft.price,
            image_url,
            embedding,
        };

        match self.catalog.insert(&product).await {
            Ok(stored) => {
                info!(
                    target: "vs.ingest",
                    product_id = %stored.id,
                    image = %path,
                    "Product created"
                );
                Ok(stored)
            }
            Err(insert_err) => Err(self.roll_back_upload(&path, insert_err.to_string()).await),
        }
    }

    async fn roll_back_upload(&self, path: &str, detail: String) -> IngestError {
        match self.storage.remove(&self.bucket, path).await {
            Ok(()) => {
                warn!(target: "vs.ingest", image = %path, "Insert failed, uploaded image removed");
                IngestError::collaborator(IngestStage::Insert, detail)
            }
            Err(remove_err) => {
                warn!(
                    target: "vs.ingest",
                    image = %path,
                    error = %remove_err,
                    "Insert failed and uploaded image could not be removed"
                );
                IngestError::CollaboratorFailure {
                    stage: IngestStage::Insert,
                    detail,
                    orphaned_object: Some(format!("{}/{path}", self.bucket)),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::services::mock::{MemoryCatalog, MemoryStorage, MockEmbedder};

    struct Fixture {
        embedder: Arc<MockEmbedder>,
        storage: Arc<MemoryStorage>,
        catalog: Arc<MemoryCatalog>,
    }

    impl Fixture {
        fn new(embedder: MockEmbedder, storage: MemoryStorage, catalog: MemoryCatalog) -> Self {
            Self {
                embedder: Arc::new(embedder),
                storage: Arc::new(storage),
                catalog: Arc::new(catalog),
            }
        }

        fn healthy() -> Self {
            Self::new(
                MockEmbedder::accepting(4),
                MemoryStorage::accepting(),
                MemoryCatalog::accepting(),
            )
        }

        fn service(&self) -> IngestionService {
            IngestionService::new(
                Arc::clone(&self.embedder) as Arc<dyn ImageEmbedder>,
                Arc::clone(&self.storage) as Arc<dyn ObjectStorage>,
                Arc::clone(&self.catalog) as Arc<dyn CatalogStore>,
                "product-images",
            )
        }
    }

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Trail Runner".to_string(),
            brand: "Stride".to_string(),
            category: "shoes".to_string(),
            price: 89.5,
            image: Bytes::from_static(b"\xff\xd8\xff\xe0jpeg"),
            image_content_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_product_runs_all_stages() {
        let fixture = Fixture::healthy();

        let stored = fixture.service().create_product(draft()).await.unwrap();

        assert_eq!(stored.name, "Trail Runner");
        assert_eq!(stored.price, 89.5);
        assert!(stored.image_url.starts_with("memory://product-images/"));
        assert!(stored.image_url.ends_with(".jpg"));
        assert_eq!(fixture.embedder.call_count(), 1);

        let objects = fixture.storage.objects();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].starts_with("product-images/"));

        let rows = fixture.catalog.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding.len(), 4);
        assert_eq!(rows[0].image_url, stored.image_url);
    }

    #[tokio::test]
    async fn test_invalid_draft_touches_no_collaborator() {
        let fixture = Fixture::healthy();
        let mut bad = draft();
        bad.price = -1.0;

        let err = fixture.service().create_product(bad).await.unwrap_err();

        assert!(matches!(err, IngestError::BadRequest(_)));
        assert_eq!(fixture.embedder.call_count(), 0);
        assert!(fixture.storage.objects().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_stops_before_upload() {
        let fixture = Fixture::new(
            MockEmbedder::failing(),
            MemoryStorage::accepting(),
            MemoryCatalog::accepting(),
        );

        let err = fixture.service().create_product(draft()).await.unwrap_err();

        match err {
            IngestError::CollaboratorFailure { stage, .. } => {
                assert_eq!(stage, IngestStage::Embedding);
            }
            other => panic!("expected collaborator failure, got {other:?}"),
        }
        assert!(fixture.storage.objects().is_empty());
        assert!(fixture.catalog.rows().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_skips_insert() {
        let fixture = Fixture::new(
            MockEmbedder::accepting(4),
            MemoryStorage::failing_upload(),
            MemoryCatalog::accepting(),
        );

        let err = fixture.service().create_product(draft()).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::CollaboratorFailure {
                stage: IngestStage::Upload,
                ..
            }
        ));
        assert!(fixture.catalog.rows().is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_removes_uploaded_image() {
        let fixture = Fixture::new(
            MockEmbedder::accepting(4),
            MemoryStorage::accepting(),
            MemoryCatalog::failing(),
        );

        let err = fixture.service().create_product(draft()).await.unwrap_err();

        match err {
            IngestError::CollaboratorFailure {
                stage,
                orphaned_object,
                ..
            } => {
                assert_eq!(stage, IngestStage::Insert);
                assert_eq!(orphaned_object, None);
            }
            other => panic!("expected collaborator failure, got {other:?}"),
        }
        assert!(fixture.storage.objects().is_empty());
        assert_eq!(fixture.storage.remove_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_rollback_reports_orphan() {
        let fixture = Fixture::new(
            MockEmbedder::accepting(4),
            MemoryStorage::failing_remove(),
            MemoryCatalog::failing(),
        );

        let err = fixture.service().create_product(draft()).await.unwrap_err();

        let IngestError::CollaboratorFailure {
            orphaned_object: Some(orphan),
            ..
        } = err
        else {
            panic!("expected orphaned object");
        };
        assert!(orphan.starts_with("product-images/"));
        assert!(orphan.ends_with(".jpg"));
        assert_eq!(fixture.storage.objects(), vec![orphan]);
    }

    #[test]
    fn test_validate_names_the_field() {
        let mut d = draft();
        d.brand = "  ".to_string();
        assert_eq!(
            d.validate().unwrap_err().to_string(),
            "Bad request: brand must not be empty"
        );

        let mut d = draft();
        d.image = Bytes::new();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.price = f64::NAN;
        assert!(d.validate().is_err());

        let mut d = draft();
        d.price = 0.0;
        assert!(d.validate().is_ok());
    }
}
