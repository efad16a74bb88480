use anyhow::{Context, Result};
use chatql_api::auth::LoggingLinkDelivery;
use chatql_api::http::{build_router, AppState};
use chatql_api::ChatApi;
use chatql_core::bus::NotificationBus;
use chatql_core::config::Config;
use chatql_core::logging::{init_logging_with_config, LogConfig};
use chatql_core::store::SqlChatStore;
use chatql_core::ChatEngine;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatql-api")]
#[command(author, version, about = "ChatQL messaging server", long_about = None)]
struct Args {
    /// TOML configuration file; environment variables are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    info!(version = env!("CARGO_PKG_VERSION"), "ChatQL starting");

    let store = SqlChatStore::open(&config.store).context("opening chat store")?;
    let bus = NotificationBus::new();
    let engine = ChatEngine::new(Arc::new(store), Arc::new(bus));
    let api = ChatApi::new(engine, &config.auth, Arc::new(LoggingLinkDelivery));

    let state = Arc::new(AppState::new(api));
    let router = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(address = %config.server.bind_address, "Listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Shutdown requested");
    state.begin_shutdown();
    let _ = stop_tx.send(());

    match tokio::time::timeout(config.server.shutdown_timeout, server).await {
        Ok(result) => result??,
        Err(_) => warn!(
            timeout = ?config.server.shutdown_timeout,
            "Connections still open after shutdown timeout"
        ),
    }

    info!("ChatQL stopped");
    Ok(())
}
