//! leetcrew API server binary.
//!
//! Usage:
//!   leetcrew-api --config solver.toml
//!   leetcrew-api --port 8080 --bind 0.0.0.0
//!
//! Model API keys are read from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` and
//! `GOOGLE_API_KEY` when the config file does not set them. A `.env` file in
//! the working directory is loaded first.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use leetcrew_agents::SolverConfig;
use leetcrew_api::{AppState, serve};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "leetcrew-api", version, about = "Multi-agent coding problem solver API")]
struct Args {
    /// Path to a solver TOML config file.
    #[arg(short, long, env = "LEETCREW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long, env = "LEETCREW_PORT", default_value_t = 5000)]
    port: u16,

    /// Address to bind.
    #[arg(short, long, env = "LEETCREW_BIND_ADDR", default_value = "127.0.0.1")]
    bind: String,

    /// Wall-clock limit for one solve request, in seconds.
    #[arg(long, env = "LEETCREW_RUN_TIMEOUT_SECS", default_value_t = 600)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leetcrew_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = if let Some(path) = &args.config {
        tracing::info!(path = %path.display(), "Loading configuration");
        SolverConfig::from_file(path)?
    } else {
        tracing::info!("Using default configuration");
        SolverConfig::default()
    };

    if args.bind == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0 exposes the API to all network interfaces. \
             The solver has no authentication; put it behind a firewall or proxy."
        );
    }

    let state = AppState::from_config(&config)?
        .with_run_timeout(Duration::from_secs(args.timeout_secs));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
