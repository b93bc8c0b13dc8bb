use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use darkpool_node::api;
use darkpool_node::proof::GrothBackend;
use darkpool_node::settlement::DryRunSink;
use darkpool_node::{NodeConfig, NodeService};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "darkpool", about = "Dark-pool matching and settlement core for tokenized RWAs")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8080")]
    api_addr: String,
    #[arg(long, default_value = "settlement_proof.wasm")]
    circuit_wasm: PathBuf,
    #[arg(long, default_value = "settlement_proof_final.zkey")]
    circuit_zkey: PathBuf,
    #[arg(long, help = "Proof worker count; defaults to the CPU count")]
    proof_workers: Option<usize>,
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON array of whitelisted participant addresses, in leaf order"
    )]
    whitelist: Option<PathBuf>,
    #[arg(long, help = "Signature collection deadline in seconds (default: order expiry)")]
    signature_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut config = NodeConfig {
        circuit_wasm: cli.circuit_wasm,
        circuit_zkey: cli.circuit_zkey,
        signature_timeout_ms: cli.signature_timeout_secs.map(|secs| secs * 1_000),
        ..NodeConfig::default()
    };
    config.api_addr = cli.api_addr.parse().context("invalid api address")?;
    if let Some(workers) = cli.proof_workers {
        config.proof_workers = workers;
    }
    if let Some(path) = cli.whitelist {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read whitelist file {}", path.display()))?;
        config.participants =
            serde_json::from_str(&raw).context("whitelist file must be a JSON array of addresses")?;
    }

    let backend = Arc::new(
        GrothBackend::load(&config.circuit_wasm, &config.circuit_zkey)
            .context("failed to load circuit artifacts")?,
    );
    // On-chain submission is an external integration; the development sink
    // confirms locally so the pipeline can be exercised end to end.
    let sink = Arc::new(DryRunSink);

    let handle = NodeService::start(config, backend, sink).context("failed to start core")?;
    let app = api::node_router(handle.service.clone());
    let addr = handle.service.config().api_addr;

    let api_task = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                info!(api = %addr, "dark-pool api online");
                if let Err(err) = axum::serve(listener, app).await {
                    error!(%err, "api server error");
                }
            }
            Err(err) => error!(%err, "failed to bind api listener"),
        }
    });

    signal::ctrl_c()
        .await
        .context("failed to install signal handler")?;
    info!("shutting down");
    handle.shutdown().await;
    api_task.abort();
    Ok(())
}
