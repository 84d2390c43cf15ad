// ABOUTME: Entry point for the ephemeral editor session gateway.
// ABOUTME: Wires config, logging, the session manager, and the axum HTTP server together.

use anyhow::{Context, Result};
use clap::Parser;
use editor_gateway::config::Config;
use editor_gateway::http::{create_router, AppState};
use session_core::{Bridge, BridgeTunables, Container, DockerCliContainer, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period given to in-flight sessions when the gateway receives a shutdown signal.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "editor-gateway", about = "Ephemeral, isolated editor session gateway")]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml if present).
    #[arg(long)]
    config: Option<String>,

    /// Override http.port from the loaded config.
    #[arg(long)]
    port: Option<u16>,

    /// Override session_runtime.base_path from the loaded config.
    #[arg(long)]
    base_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        std::env::set_current_dir(
            std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new(".")),
        )
        .ok();
    }

    dotenvy::dotenv().ok();
    let mut config = Config::load()?;

    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(base_path) = cli.base_path {
        config.session_runtime.base_path = base_path;
    }

    init_logging(config.log_file_path.as_deref(), &config.env);

    tracing::info!(
        host = %config.http.host,
        port = config.http.port,
        image = %config.session_runtime.image_name,
        base_path = %config.session_runtime.base_path,
        env = %config.env,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.session_runtime.base_path)
        .await
        .with_context(|| {
            format!(
                "failed to create session base path {}",
                config.session_runtime.base_path
            )
        })?;

    let image_name = config.session_runtime.image_name.clone();
    let nvim_config_path = config
        .session_runtime
        .nvim_config_path
        .clone()
        .map(PathBuf::from);
    let factory = Arc::new(move || {
        Arc::new(DockerCliContainer::new(image_name.clone(), nvim_config_path.clone()))
            as Arc<dyn Container>
    });

    let manager = Arc::new(SessionManager::new(
        PathBuf::from(&config.session_runtime.base_path),
        factory,
    ));

    let ws = config.session_runtime.ws.clone();
    let bridge = Bridge::new(BridgeTunables::default(), ws.ping_interval, ws.read_timeout);

    let state = AppState {
        manager: manager.clone(),
        bridge,
        ws_config: ws,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    tracing::info!(addr = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing in-flight sessions");
    manager.shutdown(SHUTDOWN_GRACE_PERIOD).await;

    Ok(())
}

fn init_logging(log_file_path: Option<&str>, env: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("editor_gateway=debug,tower_http=debug,{env}=debug").into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_file_path {
        Some(path) => {
            let parent = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "gateway.log".to_string());
            let file_appender = tracing_appender::rolling::never(parent, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Leaked intentionally: the guard must outlive the process for the
            // file writer to flush on every log line, and main() never returns
            // early.
            Box::leak(Box::new(guard));
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
                .init();
        }
        None => registry.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
