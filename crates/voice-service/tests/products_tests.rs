//! Catalog ingestion integration tests.
//!
//! Posts multipart forms to `/products` on a `TestVoiceServer` backed by
//! in-memory collaborators.

use voice_service::services::mock::{MemoryCatalog, MemoryStorage};
use voice_test_utils::{ProductForm, TestServerOptions, TestVoiceServer, TEST_EMBEDDING_DIMENSION};

/// A complete form creates a product and returns it with 201.
#[tokio::test]
async fn test_create_product_returns_201() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn().await?;

    let response = ProductForm::default().post(&server.url()).await?;

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["id"], "1");
    assert_eq!(body["name"], "Trail Runner");
    assert_eq!(body["brand"], "Stride");
    assert_eq!(body["category"], "shoes");
    assert_eq!(body["price"], 89.5);
    let image_url = body["image_url"].as_str().unwrap_or_default();
    assert!(image_url.starts_with("memory://product-images/"));
    assert!(image_url.ends_with(".jpg"));

    let rows = server.catalog().rows();
    assert_eq!(rows.len(), 1);
    assert!(rows
        .iter()
        .all(|row| row.embedding.len() == TEST_EMBEDDING_DIMENSION));
    Ok(())
}

/// Every required field is enforced with a 400 naming it.
#[tokio::test]
async fn test_missing_fields_return_400() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn().await?;

    for field in ["name", "brand", "category", "price", "image"] {
        let response = ProductForm::default()
            .without(field)
            .post(&server.url())
            .await?;

        assert_eq!(response.status(), 400, "field {field}");
        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(
            body["error"]["message"],
            format!("missing field: {field}")
        );
    }

    assert!(server.storage().objects().is_empty());
    assert!(server.catalog().rows().is_empty());
    Ok(())
}

/// Invalid values are rejected before any collaborator runs.
#[tokio::test]
async fn test_invalid_values_return_400() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn().await?;

    for form in [
        ProductForm::default().field("price", "twelve"),
        ProductForm::default().field("price", "-3"),
        ProductForm::default().field("name", "   "),
        ProductForm::default().image(Vec::new(), "image/jpeg"),
    ] {
        let response = form.post(&server.url()).await?;
        assert_eq!(response.status(), 400);
    }

    assert!(server.storage().objects().is_empty());
    Ok(())
}

/// A failed insert removes the uploaded image and returns 500.
#[tokio::test]
async fn test_insert_failure_returns_500_and_cleans_up() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn_with(TestServerOptions {
        catalog: MemoryCatalog::failing(),
        ..TestServerOptions::default()
    })
    .await?;

    let response = ProductForm::default().post(&server.url()).await?;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "COLLABORATOR_FAILURE");
    assert_eq!(body["error"]["message"], "Unexpected error: insert failed");
    assert!(server.storage().objects().is_empty());
    assert_eq!(server.storage().remove_count(), 1);
    Ok(())
}

/// When the rollback also fails the response names the orphaned image.
#[tokio::test]
async fn test_orphaned_image_is_reported() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn_with(TestServerOptions {
        storage: MemoryStorage::failing_remove(),
        catalog: MemoryCatalog::failing(),
        ..TestServerOptions::default()
    })
    .await?;

    let response = ProductForm::default().post(&server.url()).await?;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await?;
    let message = body["error"]["message"].as_str().unwrap_or_default();
    let objects = server.storage().objects();
    assert_eq!(objects.len(), 1);
    assert!(objects.iter().all(|object| message.contains(object.as_str())));
    Ok(())
}

/// Upload failure stops the pipeline before the catalog insert.
#[tokio::test]
async fn test_upload_failure_returns_500() -> Result<(), anyhow::Error> {
    let server = TestVoiceServer::spawn_with(TestServerOptions {
        storage: MemoryStorage::failing_upload(),
        ..TestServerOptions::default()
    })
    .await?;

    let response = ProductForm::default().post(&server.url()).await?;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["message"], "Unexpected error: upload failed");
    assert!(server.catalog().rows().is_empty());
    Ok(())
}
