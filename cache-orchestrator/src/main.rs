use anyhow::Result;
use cache_orchestrator::{
    AppState, CacheOrchestrator, OrchestratorConfig, create_router, init_metrics,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cache-orchestrator")]
#[command(about = "Cache orchestration service with warmup, invalidation and alerting", long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(config: &OrchestratorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.format == "pretty" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config);
    info!("Starting Cache Orchestrator v{}", env!("CARGO_PKG_VERSION"));

    init_metrics();

    let addr = config.server_addr();
    let orchestrator = CacheOrchestrator::in_memory(config);
    orchestrator.initialize().await?;

    let app = create_router(AppState::new(orchestrator.clone()));

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    orchestrator.shutdown().await;
    Ok(())
}
