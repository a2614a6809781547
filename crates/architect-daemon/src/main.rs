//! The `architectd` binary: loads configuration from the environment,
//! builds an [`architect_core::Engine`], and serves the HTTP surface
//! defined in `routes` until it receives `SIGINT`/`SIGTERM`.

use architect_core::{Engine, EngineConfig};
use architectd::routes;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// The daemon takes no required arguments; every tunable lives in
/// `ARCHITECT_*` environment variables so it runs the
/// same way under a process manager as it does on a developer's shell.
#[derive(Parser, Debug)]
#[command(name = "architectd", about = "Architect engine HTTP daemon")]
struct Cli {
    /// Overrides the HTTP bind address, taking precedence over
    /// `ARCHITECT_HTTP_BIND` and the built-in default.
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("ARCHITECT_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = EngineConfig::from_env();
    if let Some(bind) = cli.bind {
        config.http_bind_address = bind;
    }
    let bind_address = config.http_bind_address;

    let engine = Engine::new(config).await;
    let app = routes::router(engine);

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(source) => {
            tracing::error!(%bind_address, %source, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%bind_address, "architectd listening");

    if let Err(source) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(%source, "HTTP server exited with an error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
    tracing::info!("shutdown signal received");
}
