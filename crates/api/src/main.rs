use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trickplay_api::config::ServerConfig;
use trickplay_api::router::build_app_router;
use trickplay_api::state::AppState;
use trickplay_core::config::TrickplayConfig;
use trickplay_pipeline::bulk::BulkJobs;
use trickplay_pipeline::generator::TrickplayGenerator;
use trickplay_pipeline::library::{DirectoryLibrary, SharedLibrary};
use trickplay_pipeline::monitor::TracingMonitor;
use trickplay_pipeline::serving::TrickplayService;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trickplay_api=debug,trickplay_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let trickplay_config =
        Arc::new(TrickplayConfig::from_env().expect("Invalid trickplay configuration"));
    tracing::info!(
        widths = ?trickplay_config.widths,
        interval_ms = trickplay_config.interval_ms,
        policy = ?trickplay_config.storage_policy(),
        on_demand = trickplay_config.on_demand_generation,
        "Loaded trickplay configuration"
    );

    // --- Library ---
    let library: SharedLibrary = Arc::new(DirectoryLibrary::new(
        &trickplay_config.media_root,
        trickplay_config.metadata_root(),
        &trickplay_config.ffprobe_path,
    ));
    tracing::info!(root = %trickplay_config.media_root.display(), "Directory library ready");

    // --- Pipeline ---
    let shutdown = CancellationToken::new();
    let generator = Arc::new(TrickplayGenerator::new(
        Arc::clone(&trickplay_config),
        Arc::new(TracingMonitor),
    ));
    let trickplay = Arc::new(TrickplayService::new(
        Arc::clone(&trickplay_config),
        Arc::clone(&library),
        Arc::clone(&generator),
        shutdown.child_token(),
    ));
    let jobs = Arc::new(BulkJobs::new(
        Arc::clone(&generator),
        Arc::clone(&library),
        shutdown.child_token(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        trickplay: Arc::clone(&trickplay),
        jobs: Arc::clone(&jobs),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cancelling background generation");
    shutdown.cancel();
    let drain = async {
        trickplay.shutdown().await;
        jobs.shutdown().await;
    };
    if tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), drain)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Background jobs did not drain in time"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
