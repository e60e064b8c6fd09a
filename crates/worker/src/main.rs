//! One-shot "Generate BIF files" run over the whole library.
//!
//! Meant for cron or a systemd timer. Ctrl-C (or SIGTERM) cancels the run;
//! in-flight extractions are killed and their scratch space removed.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trickplay_core::config::TrickplayConfig;
use trickplay_pipeline::bulk::generate::generate_all;
use trickplay_pipeline::bulk::TracingProgress;
use trickplay_pipeline::generator::TrickplayGenerator;
use trickplay_pipeline::library::DirectoryLibrary;
use trickplay_pipeline::monitor::TracingMonitor;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // LOG_FORMAT=json switches to one JSON object per line.
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trickplay_worker=debug,trickplay_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let config = Arc::new(TrickplayConfig::from_env().expect("Invalid trickplay configuration"));
    tracing::info!(
        widths = ?config.widths,
        workers = config.parallel_processes,
        root = %config.media_root.display(),
        "Worker starting"
    );

    let library = DirectoryLibrary::new(
        &config.media_root,
        config.metadata_root(),
        &config.ffprobe_path,
    );
    let generator = Arc::new(TrickplayGenerator::new(
        Arc::clone(&config),
        Arc::new(TracingMonitor),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match generate_all(&generator, &library, Arc::new(TracingProgress), &cancel).await {
        Ok(summary) if cancel.is_cancelled() => {
            tracing::warn!(?summary, "Generation cancelled");
            ExitCode::from(130)
        }
        Ok(summary) if summary.failed > 0 => {
            tracing::warn!(?summary, "Generation finished with failures");
            ExitCode::FAILURE
        }
        Ok(summary) => {
            tracing::info!(?summary, "Generation finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not list the library");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), cancelling"),
        () = terminate => tracing::info!("Received SIGTERM, cancelling"),
    }
    cancel.cancel();
}
