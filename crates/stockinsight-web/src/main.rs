use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use stockinsight_core::AppConfig;
use stockinsight_web::{app, AppState, StartupError};

const RECEIPT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Stock insight API server. Configuration comes from the environment;
/// flags override it.
#[derive(Debug, Parser)]
#[command(name = "stockinsight", version, about = "AI stock insight API server")]
struct Args {
    /// Bind host
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Bind port
    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    /// DuckDB file
    #[arg(long, env = "STOCKINSIGHT_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let mut config = AppConfig::from_env()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.db_path = db_path;
    }

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| StartupError::BindAddress(bind.clone()))?;

    let state = AppState::from_config(&config)?;
    if !state.generator.router().has_configured_provider() {
        warn!("no LLM API key configured; analyses will fail until one is set");
    }

    // Warm the market directory so the first domestic lookup is fast.
    let directory = Arc::clone(state.resolver.directory());
    tokio::spawn(async move {
        directory.ensure_fresh().await;
        info!("market directory ready: {} listings", directory.stock_count());
    });

    let gate = Arc::clone(&state.gate);
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(RECEIPT_SWEEP_INTERVAL);
        loop {
            ticks.tick().await;
            let refunded = gate.refund_expired_receipts().await;
            if refunded > 0 {
                info!("refunded {refunded} receipts that expired unredeemed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("stockinsight listening on http://{addr}");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, stopping");
}
