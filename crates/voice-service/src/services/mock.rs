//! In-memory ingestion collaborators for tests and local runs.
//!
//! Each mock counts its calls and can be told to fail, so pipeline tests
//! can exercise every stage without a network.

use super::catalog_store::{CatalogStore, NewProduct, StoredProduct};
use super::embedding::{l2_normalize, ImageEmbedder};
use super::object_storage::ObjectStorage;
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Embedder returning a unit vector derived from the image bytes.
pub struct MockEmbedder {
    dimension: usize,
    return_error: bool,
    call_count: AtomicUsize,
}

impl MockEmbedder {
    /// Create a mock that always embeds into `dimension` values.
    #[must_use]
    pub fn accepting(dimension: usize) -> Self {
        Self {
            dimension,
            return_error: false,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            dimension: 0,
            return_error: true,
            call_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageEmbedder for MockEmbedder {
    async fn embed(&self, image: Bytes, _content_type: &str) -> Result<Vec<f32>, CollaboratorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.return_error {
            return Err(CollaboratorError::Unavailable(
                "Mock embedder error".to_string(),
            ));
        }

        let seed: u32 = image.iter().map(|b| u32::from(*b)).sum();
        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let offset = i as u32;
                ((seed.wrapping_add(offset) % 7) + 1) as f32
            })
            .collect();
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// Object storage backed by a map of `bucket/path` to bytes.
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Bytes>>,
    fail_upload: bool,
    fail_remove: bool,
    remove_count: AtomicUsize,
}

impl MemoryStorage {
    fn build(fail_upload: bool, fail_remove: bool) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_upload,
            fail_remove,
            remove_count: AtomicUsize::new(0),
        }
    }

    /// Create a store that accepts every upload and removal.
    #[must_use]
    pub fn accepting() -> Self {
        Self::build(false, false)
    }

    /// Create a store whose uploads fail.
    #[must_use]
    pub fn failing_upload() -> Self {
        Self::build(true, false)
    }

    /// Create a store that accepts uploads but cannot remove them.
    #[must_use]
    pub fn failing_remove() -> Self {
        Self::build(false, true)
    }

    /// Stored object paths as `bucket/path`, sorted.
    #[must_use]
    pub fn objects(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn remove_count(&self) -> usize {
        self.remove_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<String, CollaboratorError> {
        if self.fail_upload {
            return Err(CollaboratorError::Status {
                status: 503,
                body: "Mock storage unavailable".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(format!("{bucket}/{key}"), bytes);
        Ok(key.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), CollaboratorError> {
        self.remove_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove {
            return Err(CollaboratorError::Unavailable(
                "Mock storage remove error".to_string(),
            ));
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&format!("{bucket}/{path}"));
        Ok(())
    }
}

/// Catalog keeping inserted rows in memory, numbered from 1.
pub struct MemoryCatalog {
    rows: Mutex<Vec<NewProduct>>,
    return_error: bool,
}

impl MemoryCatalog {
    /// Create a catalog that accepts every insert.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            return_error: false,
        }
    }

    /// Create a catalog whose inserts fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            return_error: true,
        }
    }

    /// Rows inserted so far, embeddings included.
    #[must_use]
    pub fn rows(&self) -> Vec<NewProduct> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert(&self, product: &NewProduct) -> Result<StoredProduct, CollaboratorError> {
        if self.return_error {
            return Err(CollaboratorError::Status {
                status: 409,
                body: "Mock catalog conflict".to_string(),
            });
        }

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.push(product.clone());
        Ok(StoredProduct {
            id: rows.len().to_string(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            price: product.price,
            image_url: product.image_url.clone(),
        })
    }
}
