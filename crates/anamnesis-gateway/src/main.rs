use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use anamnesis_core::config::AnamnesisConfig;
use anamnesis_gateway::{http, mcp_bridge, state::AppState};

#[derive(Parser)]
#[command(name = "anamnesis-gateway")]
struct Cli {
    /// Path to anamnesis.toml. Falls back to $CLAUDE_HOME/anamnesis.toml.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP tool server and background ingestion loop (default).
    Serve,
    /// Run the stdio JSON-RPC tool bridge.
    Mcp,
    /// Drain one batch of unungested messages and exit.
    Ingest,
    /// Run the health probes once and exit.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anamnesis_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match AnamnesisConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Mcp => run_mcp(config).await,
        Command::Ingest => ingest_once(config).await,
        Command::Health => health_once(config).await,
    }
}

async fn build_state(config: AnamnesisConfig) -> anyhow::Result<Arc<AppState>> {
    match AppState::build(config).await {
        Ok(state) => Ok(Arc::new(state)),
        Err(e) => {
            eprintln!("startup error: {e}");
            std::process::exit(2);
        }
    }
}

async fn serve(config: AnamnesisConfig) -> anyhow::Result<()> {
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = build_state(config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ingestion = state.ingestion.clone();
    tokio::spawn(async move { ingestion.run(shutdown_rx).await });

    let router = http::build_router(state.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("anamnesis gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    let _ = shutdown_tx.send(true);
    result?;
    Ok(())
}

async fn run_mcp(config: AnamnesisConfig) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    mcp_bridge::run(state).await
}

async fn ingest_once(config: AnamnesisConfig) -> anyhow::Result<()> {
    use anamnesis_ingest::{BatchStatus, TickOutcome};

    let state = build_state(config).await?;
    match state.ingestion.tick().await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string(&outcome)?);
            if let TickOutcome::Completed { status, failed, succeeded, .. } = &outcome {
                if *status == BatchStatus::Partial || *status == BatchStatus::Failed {
                    eprintln!(
                        "ingestion batch {status}: {failed} of {} records failed ({succeeded} succeeded)",
                        failed + succeeded
                    );
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("ingestion batch failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn health_once(config: AnamnesisConfig) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let health = state.health.check().await;
    println!("{}", serde_json::to_string_pretty(&health)?);
    if health.ok {
        Ok(())
    } else {
        warn!("system health check failed");
        std::process::exit(1);
    }
}
