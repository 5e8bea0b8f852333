//! Voice Service
//!
//! Entry point for the voice commerce backend: streaming sessions on
//! `/ws/products` and catalog ingestion on `/products`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use voice_service::config::Config;
use voice_service::notify::{DummySourceFactory, NotificationPolicy, StubCatalog};
use voice_service::observability::{metrics, HealthState};
use voice_service::routes::{self, AppState};
use voice_service::services::{
    HttpImageEmbedder, IngestionService, SupabaseCatalog, SupabaseStorage,
};
use voice_service::session::{SessionConfig, SessionManager};
use voice_service::sink::FsAudioSink;

/// How long to wait for live sessions to close after shutdown starts.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it decides the log format
    let config = Config::from_env()?;

    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_service=debug,tower_http=debug".into()),
        )
        .with(fmt_layer)
        .init();

    info!("Starting Voice Service");
    info!(
        bind_address = %config.bind_address,
        audio_dir = %config.audio_dir.display(),
        echo_audio = config.echo_audio,
        notify_seed = ?config.notify_seed,
        embedding_service_url = %config.embedding_service_url,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = metrics::init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let manager = Arc::new(SessionManager::new(
        Arc::new(FsAudioSink::new(config.audio_dir.clone())),
        Arc::new(DummySourceFactory::new(
            NotificationPolicy::from_config(&config),
            StubCatalog::sample(),
        )),
        SessionConfig::from_config(&config),
    ));

    let ingestion = IngestionService::new(
        Arc::new(HttpImageEmbedder::new(
            config.embedding_service_url.clone(),
            config.embedding_dimension,
        )?),
        Arc::new(SupabaseStorage::new(
            config.supabase_url.clone(),
            config.supabase_key.clone(),
        )?),
        Arc::new(SupabaseCatalog::new(
            config.supabase_url.clone(),
            config.supabase_key.clone(),
            config.product_table.clone(),
        )?),
        config.product_image_bucket.clone(),
    );

    let state = Arc::new(AppState {
        manager: Arc::clone(&manager),
        ingestion,
        health: Arc::clone(&health_state),
    });
    let app = routes::build_routes(state, prometheus_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Voice Service listening on {}", addr);

    // Signal -> readiness off -> sessions closed (1001) -> HTTP drain
    let shutdown_token = CancellationToken::new();
    {
        let shutdown_token = shutdown_token.clone();
        let health_state = Arc::clone(&health_state);
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            shutdown_signal().await;
            health_state.set_draining();
            manager.shutdown();
            shutdown_token.cancel();
        });
    }

    health_state.set_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    if manager.wait_idle(SESSION_DRAIN_TIMEOUT).await {
        info!("All sessions closed");
    } else {
        warn!(
            active = manager.active_sessions(),
            "Sessions still open after drain timeout"
        );
    }

    info!(
        total_sessions = manager.total_sessions(),
        "Voice Service shutdown complete"
    );

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
