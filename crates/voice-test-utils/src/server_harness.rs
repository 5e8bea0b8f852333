//! Test server harness for E2E testing
//!
//! Provides `TestVoiceServer` for spawning real voice service instances in
//! tests. Ingestion collaborators are in-memory mocks; audio goes to a
//! temp directory removed when the server is dropped.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use voice_service::config::Config;
use voice_service::notify::{DummySourceFactory, NotificationPolicy, StubCatalog};
use voice_service::observability::HealthState;
use voice_service::routes::{self, AppState};
use voice_service::services::mock::{MemoryCatalog, MemoryStorage, MockEmbedder};
use voice_service::services::{CatalogStore, IngestionService, ObjectStorage};
use voice_service::session::{SessionConfig, SessionManager};
use voice_service::sink::FsAudioSink;

/// Embedding length used by the mock embedder.
pub const TEST_EMBEDDING_DIMENSION: usize = 8;

/// Knobs for a test server.
pub struct TestServerOptions {
    pub echo_audio: bool,
    /// Fixed notification delay. Defaults to an hour so notifications
    /// never interfere unless a test asks for them.
    pub notify_delay: Duration,
    pub product_probability: f64,
    pub seed: u64,
    pub handshake_timeout_secs: u64,
    pub storage: MemoryStorage,
    pub catalog: MemoryCatalog,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            echo_audio: true,
            notify_delay: Duration::from_secs(3600),
            product_probability: 0.7,
            seed: 42,
            handshake_timeout_secs: 30,
            storage: MemoryStorage::accepting(),
            catalog: MemoryCatalog::accepting(),
        }
    }
}

/// Test harness for spawning the voice service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestVoiceServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestVoiceServer {
    addr: SocketAddr,
    config: Config,
    manager: Arc<SessionManager>,
    health: Arc<HealthState>,
    storage: Arc<MemoryStorage>,
    catalog: Arc<MemoryCatalog>,
    _audio_dir: TempDir,
    _handle: JoinHandle<()>,
}

impl TestVoiceServer {
    /// Spawn a server with default options.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawn a server on a random port.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Store audio in a fresh temp directory
    /// - Report ready on `/ready`
    pub async fn spawn_with(options: TestServerOptions) -> Result<Self, anyhow::Error> {
        let audio_dir = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("Failed to create audio dir: {}", e))?;
        let delay_ms = options.notify_delay.as_millis().to_string();

        let vars = HashMap::from([
            ("VOICE_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "USER_AUDIO_DIR".to_string(),
                audio_dir.path().display().to_string(),
            ),
            ("VOICE_NOTIFY_DELAY_MIN_MS".to_string(), delay_ms.clone()),
            ("VOICE_NOTIFY_DELAY_MAX_MS".to_string(), delay_ms),
            (
                "VOICE_NOTIFY_PRODUCT_PROBABILITY".to_string(),
                options.product_probability.to_string(),
            ),
            ("VOICE_NOTIFY_SEED".to_string(), options.seed.to_string()),
            (
                "VOICE_ECHO_AUDIO".to_string(),
                options.echo_audio.to_string(),
            ),
            (
                "VOICE_HANDSHAKE_TIMEOUT_SECONDS".to_string(),
                options.handshake_timeout_secs.to_string(),
            ),
            (
                "SUPABASE_URL".to_string(),
                "http://127.0.0.1:54321".to_string(),
            ),
            (
                "SUPABASE_SERVICE_ROLE_KEY".to_string(),
                "test-service-key".to_string(),
            ),
            (
                "EMBEDDING_SERVICE_URL".to_string(),
                "http://127.0.0.1:8001/embed".to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let manager = Arc::new(SessionManager::new(
            Arc::new(FsAudioSink::new(config.audio_dir.clone())),
            Arc::new(DummySourceFactory::new(
                NotificationPolicy::from_config(&config),
                StubCatalog::sample(),
            )),
            SessionConfig::from_config(&config),
        ));

        let storage = Arc::new(options.storage);
        let catalog = Arc::new(options.catalog);
        let ingestion = IngestionService::new(
            Arc::new(MockEmbedder::accepting(TEST_EMBEDDING_DIMENSION)),
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            Arc::clone(&catalog) as Arc<dyn CatalogStore>,
            config.product_image_bucket.clone(),
        );

        let health = Arc::new(HealthState::new());
        let state = Arc::new(AppState {
            manager: Arc::clone(&manager),
            ingestion,
            health: Arc::clone(&health),
        });

        // A handle without a global recorder: tests may spawn many servers
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        health.set_ready();

        Ok(Self {
            addr,
            config,
            manager,
            health,
            storage,
            catalog,
            _audio_dir: audio_dir,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of the streaming endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws/products", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory receiving inbound audio.
    pub fn audio_dir(&self) -> &Path {
        &self.config.audio_dir
    }

    /// Persisted audio file names, sorted.
    pub fn stored_audio(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.audio_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| !name.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    /// Begin shutdown the way the binary does: readiness off, then close
    /// every live session.
    pub fn begin_shutdown(&self) {
        self.health.set_draining();
        self.manager.shutdown();
    }
}

impl Drop for TestVoiceServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends.
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestVoiceServer::spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.ws_url().ends_with("/ws/products"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let response = reqwest::get(format!("{}/ready", server.url())).await?;
        assert_eq!(response.status(), 200);

        Ok(())
    }

    #[tokio::test]
    async fn test_servers_have_isolated_audio_dirs() -> Result<(), anyhow::Error> {
        let a = TestVoiceServer::spawn().await?;
        let b = TestVoiceServer::spawn().await?;

        assert_ne!(a.audio_dir(), b.audio_dir());
        assert!(a.stored_audio().is_empty());
        Ok(())
    }
}
