//! HTTP routes for the voice service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::observability::{health_router, HealthState};
use crate::services::IngestionService;
use crate::session::SessionManager;
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for plain HTTP requests. An upgraded stream is not
/// bound by it once the 101 response is sent.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs streaming sessions.
    pub manager: Arc<SessionManager>,

    /// Catalog ingestion pipeline.
    pub ingestion: IngestionService,

    /// Liveness/readiness phase.
    pub health: Arc<HealthState>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/ws/products` - duplex streaming session (WebSocket upgrade)
/// - `/products` and `/products/` - catalog ingestion (multipart)
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (503 while starting or draining)
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let health_routes = health_router(Arc::clone(&state.health));

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let create_product = post(handlers::create_product)
        .layer(DefaultBodyLimit::max(handlers::products::MAX_UPLOAD_BYTES));

    let api_routes = Router::new()
        .route("/ws/products", get(handlers::products_stream))
        .route("/products", create_product.clone())
        .route("/products/", create_product)
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    api_routes
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(TraceLayer::new_for_http())
}

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "vs.metrics.scrape")]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::notify::{DummySourceFactory, NotificationPolicy, StubCatalog};
    use crate::services::mock::{MemoryCatalog, MemoryStorage, MockEmbedder};
    use crate::session::SessionConfig;
    use crate::sink::FsAudioSink;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    const BOUNDARY: &str = "vs-test-boundary";

    struct TestApp {
        router: Router,
        storage: Arc<MemoryStorage>,
        catalog: Arc<MemoryCatalog>,
        health: Arc<HealthState>,
        _audio: tempfile::TempDir,
    }

    fn app_with(storage: MemoryStorage, catalog: MemoryCatalog) -> TestApp {
        let audio = tempfile::tempdir().unwrap();
        let storage = Arc::new(storage);
        let catalog = Arc::new(catalog);
        let health = Arc::new(HealthState::new());
        let manager = Arc::new(SessionManager::new(
            Arc::new(FsAudioSink::new(audio.path())),
            Arc::new(DummySourceFactory::new(
                NotificationPolicy::default().with_seed(7),
                StubCatalog::sample(),
            )),
            SessionConfig::default(),
        ));
        let ingestion = IngestionService::new(
            Arc::new(MockEmbedder::accepting(4)),
            Arc::clone(&storage) as Arc<dyn crate::services::ObjectStorage>,
            Arc::clone(&catalog) as Arc<dyn crate::services::CatalogStore>,
            "product-images",
        );
        let state = Arc::new(AppState {
            manager,
            ingestion,
            health: Arc::clone(&health),
        });
        let handle = PrometheusBuilder::new().build_recorder().handle();

        TestApp {
            router: build_routes(state, handle),
            storage,
            catalog,
            health,
            _audio: audio,
        }
    }

    fn app() -> TestApp {
        app_with(MemoryStorage::accepting(), MemoryCatalog::accepting())
    }

    fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"p.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn products_request(body: Vec<u8>) -> Request<Body> {
        products_request_to("/products", body)
    }

    fn products_request_to(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const FULL_FORM: [(&str, &str); 4] = [
        ("name", "Trail Runner"),
        ("brand", "Stride"),
        ("category", "shoes"),
        ("price", "89.50"),
    ];

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_create_product_returns_created_record() {
        let app = app();

        let response = app
            .router
            .oneshot(products_request(multipart_body(&FULL_FORM, Some(b"jpeg"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json(response).await;
        assert_eq!(body["id"], "1");
        assert_eq!(body["name"], "Trail Runner");
        assert_eq!(body["brand"], "Stride");
        assert_eq!(body["category"], "shoes");
        assert_eq!(body["price"], 89.5);
        assert!(body["image_url"]
            .as_str()
            .unwrap()
            .starts_with("memory://product-images/"));
        assert!(body.get("embedding").is_none());
        assert_eq!(app.catalog.rows().len(), 1);
        assert_eq!(app.storage.objects().len(), 1);
    }

    #[tokio::test]
    async fn test_create_product_accepts_trailing_slash() {
        let app = app();

        let response = app
            .router
            .oneshot(products_request_to(
                "/products/",
                multipart_body(&FULL_FORM, Some(b"jpeg")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(app.catalog.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let app = app();
        let form = [("name", "Lamp"), ("brand", "Lumen"), ("price", "10")];

        let response = app
            .router
            .oneshot(products_request(multipart_body(&form, Some(b"jpeg"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "missing field: category");
        assert!(app.storage.objects().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_bad_request() {
        let app = app();

        let response = app
            .router
            .oneshot(products_request(multipart_body(&FULL_FORM, None)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["message"], "missing field: image");
    }

    #[tokio::test]
    async fn test_non_numeric_price_is_bad_request() {
        let app = app();
        let form = [
            ("name", "Lamp"),
            ("brand", "Lumen"),
            ("category", "home"),
            ("price", "cheap"),
        ];

        let response = app
            .router
            .oneshot(products_request(multipart_body(&form, Some(b"jpeg"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/products")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_server_error() {
        let app = app_with(MemoryStorage::accepting(), MemoryCatalog::failing());

        let response = app
            .router
            .oneshot(products_request(multipart_body(&FULL_FORM, Some(b"jpeg"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(response).await;
        assert_eq!(body["error"]["code"], "COLLABORATOR_FAILURE");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Unexpected error: insert failed"));
        assert!(app.storage.objects().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_readiness_are_mounted() {
        let app = app();
        app.health.set_ready();

        let health = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let ready = app
            .router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let app = app();

        let response = app
            .router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_requires_websocket_upgrade() {
        let app = app();

        let response = app
            .router
            .oneshot(Request::get("/ws/products").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
