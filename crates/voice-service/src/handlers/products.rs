//! `POST /products` - catalog ingestion.
//!
//! Accepts `multipart/form-data` with text fields `name`, `brand`,
//! `category`, `price` and a file field `image`. Unknown fields are
//! ignored.

use crate::errors::IngestError;
use crate::observability::metrics;
use crate::routes::AppState;
use crate::services::{ProductDraft, StoredProduct};
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Largest accepted request body (image plus form fields).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Fallback content type when the image part declares none.
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Handler for POST /products
///
/// # Response
///
/// - 201 Created: `{id, name, brand, category, price, image_url}`
/// - 400 Bad Request: missing or invalid field, or not multipart
/// - 500 Internal Server Error: a collaborator failed
#[instrument(skip_all, name = "vs.handlers.products")]
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<StoredProduct>), IngestError> {
    let started = Instant::now();
    let result = ingest(&state, multipart).await;

    let status = match &result {
        Ok(_) => StatusCode::CREATED.as_u16(),
        Err(err) => err.status_code(),
    };
    metrics::record_product_ingest(status, started.elapsed());

    result.map(|stored| (StatusCode::CREATED, Json(stored)))
}

async fn ingest(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StoredProduct, IngestError> {
    let mut multipart = multipart.map_err(|e| IngestError::BadRequest(e.body_text()))?;
    let draft = read_form(&mut multipart).await?;
    debug!(
        target: "vs.handlers.products",
        name = %draft.name,
        image_bytes = draft.image.len(),
        "Product form received"
    );
    state.ingestion.create_product(draft).await
}

#[derive(Default)]
struct FormFields {
    name: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    price: Option<String>,
    image: Option<(Bytes, String)>,
}

async fn read_form(multipart: &mut Multipart) -> Result<ProductDraft, IngestError> {
    let mut fields = FormFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "name" => fields.name = Some(text(field).await?),
            "brand" => fields.brand = Some(text(field).await?),
            "category" => fields.category = Some(text(field).await?),
            "price" => fields.price = Some(text(field).await?),
            "image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| IngestError::BadRequest(e.body_text()))?;
                fields.image = Some((bytes, content_type));
            }
            _ => {}
        }
    }

    let price_raw = required(fields.price, "price")?;
    let price = price_raw
        .trim()
        .parse::<f64>()
        .map_err(|_| IngestError::BadRequest(format!("price is not a number: {price_raw}")))?;
    let (image, image_content_type) = fields
        .image
        .ok_or_else(|| IngestError::BadRequest("missing field: image".to_string()))?;

    let draft = ProductDraft {
        name: required(fields.name, "name")?,
        brand: required(fields.brand, "brand")?,
        category: required(fields.category, "category")?,
        price,
        image,
        image_content_type,
    };
    draft.validate()?;
    Ok(draft)
}

async fn text(field: Field<'_>) -> Result<String, IngestError> {
    field
        .text()
        .await
        .map_err(|e| IngestError::BadRequest(e.body_text()))
}

fn required(value: Option<String>, field: &str) -> Result<String, IngestError> {
    value.ok_or_else(|| IngestError::BadRequest(format!("missing field: {field}")))
}
