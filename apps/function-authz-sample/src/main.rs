//! Sample axum host for the function authorization engine.
//!
//! ```text
//! curl -H 'Authorization: Bearer alice:reader' http://127.0.0.1:8087/api/orders/7
//! ```

mod config;
mod functions;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use function_authz::FunctionAuthorizationRuntime;
use function_authz::axum_ext::FunctionAuthorizationLayer;
use function_authz_sdk::{HostModel, MetadataScanner};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::AppConfig;

/// Function authorization sample server
#[derive(Parser, Debug)]
#[command(name = "function-authz-sample")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/function-authz-sample.yaml")]
    config: PathBuf,

    /// Overrides `server.bind_addr`
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Register every function at startup instead of on first request
    #[arg(long)]
    eager: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let bind_addr = args.bind.unwrap_or(config.server.bind_addr);

    let scanner = Arc::new(functions::scanner());
    let runtime = FunctionAuthorizationRuntime::builder()
        .config(config.function_authz)
        .host_model(HostModel::Middleware)
        .schemes(functions::schemes())
        .scanner(Arc::clone(&scanner) as Arc<dyn MetadataScanner>)
        .build()?;

    if args.eager {
        runtime.register_all(scanner.as_ref())?;
    }
    runtime.start();

    let app = functions::router().layer(FunctionAuthorizationLayer::new(
        Arc::clone(runtime.executor()),
        functions::routes()?,
    ));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "function authorization sample listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
