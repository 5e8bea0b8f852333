//! Collaborators behind catalog ingestion.
//!
//! # Components
//!
//! - `embedding` - image embedding service client
//! - `object_storage` - product image storage
//! - `catalog_store` - product table
//! - `ingestion` - the pipeline tying the three together
//! - `mock` - in-memory stand-ins with failure injection

pub mod catalog_store;
pub mod embedding;
pub mod ingestion;
pub mod mock;
pub mod object_storage;

pub use catalog_store::{CatalogStore, NewProduct, StoredProduct, SupabaseCatalog};
pub use embedding::{HttpImageEmbedder, ImageEmbedder};
pub use ingestion::{IngestionService, ProductDraft};
pub use object_storage::{ObjectStorage, SupabaseStorage};
