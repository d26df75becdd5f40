use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listgrab_core::{
    load_config, validate_config, Converter, Extractor, FfmpegConverter, JobController,
    YtDlpExtractor,
};
use listgrab_server::api::{create_router, WsBroadcaster};
use listgrab_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    // LISTGRAB_LOG_FORMAT=json switches to one JSON object per line
    if std::env::var("LISTGRAB_LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let config_path = std::env::var_os("LISTGRAB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = load_config(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    validate_config(&config).context("invalid configuration")?;
    info!(
        "Configuration from {} (yt-dlp: {}, ffmpeg: {})",
        config_path.display(),
        config.extractor.ytdlp_path.display(),
        config.converter.ffmpeg_path.display()
    );

    // Missing tools only fail the jobs that need them
    let extractor = Arc::new(YtDlpExtractor::new(config.extractor.clone()));
    if let Err(e) = extractor.validate().await {
        warn!("{} unavailable, downloads will fail: {}", extractor.name(), e);
    }
    let converter = Arc::new(FfmpegConverter::new(config.converter.clone()));
    if let Err(e) = converter.validate().await {
        warn!("{} unavailable, MP3 conversion will fail: {}", converter.name(), e);
    }

    let controller = Arc::new(JobController::new(&config, extractor, converter));
    let ws_broadcaster = WsBroadcaster::new(config.jobs.event_buffer);
    let forwarder = ws_broadcaster.forward(controller.events());

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&controller),
        ws_broadcaster,
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // A running job is cancelled and drained before exit
    info!("Shutting down");
    controller.shutdown().await;
    forwarder.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
