// AUGV vision server
// Agent frame ingestion, obstacle reporting and live monitoring

use anyhow::Context;
use augv_core::AugvConfig;
use augv_server::{build_state, create_router, detector_from_config, AppState, TcpControlNotifier};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "augv-server")]
#[command(about = "Multi-agent AUGV frame ingestion and obstacle reporting server", long_about = None)]
#[command(version)]
struct Args {
    /// TOML or JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// HTTP / WebSocket port
    #[arg(long)]
    port: Option<u16>,

    /// Simulation control port
    #[arg(long)]
    control_port: Option<u16>,

    /// Detector inference endpoint
    #[arg(long)]
    detector_url: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<AugvConfig> {
    let mut config = match &args.config {
        Some(path) => AugvConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AugvConfig::default(),
    };
    config.apply_env();

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.control_port {
        config.control.port = port;
    }
    if let Some(url) = &args.detector_url {
        config.detector.endpoint = Some(url.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("🚀 Starting AUGV vision server...");

    let detector = detector_from_config(&config.detector).context("Failed to create detector")?;
    let notifier = Arc::new(TcpControlNotifier::from_config(&config.control));
    info!("📡 Obstacle notifications go to {}", notifier.address());

    let state = build_state(config, detector, notifier);
    let config = state.config.clone();
    let pool = state.ingestor.pool().clone();

    let reaper = pool.spawn_reaper(config.worker.idle_timeout());
    let resource_log = spawn_resource_logger(
        state.clone(),
        Duration::from_secs(config.server.resource_log_interval_secs.max(1)),
    );

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("✅ Listening on http://{}", addr);

    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server error")?;

    info!("🛑 Shutting down...");
    reaper.abort();
    resource_log.abort();
    pool.shutdown().await;

    info!("👋 AUGV vision server stopped");
    Ok(())
}

fn spawn_resource_logger(state: AppState, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let registry = state.ingestor.registry();
            let metrics = state.metrics.snapshot();
            info!(
                "[RESOURCE] Agents: {}, Streams: {}, Workers: {}, Monitor clients: {}, Frames: {}",
                registry.len(),
                registry.connected_streams().len(),
                state.ingestor.pool().running().len(),
                state.ingestor.hub().len(),
                metrics.frames_received,
            );
        }
    })
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("🛑 Shutdown signal received");
}
