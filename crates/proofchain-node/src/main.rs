mod api;
mod config;
mod constants;

use anyhow::Context;
use clap::Parser;
use proofchain_core::{Chain, ChainStore, LedgerConfig};
use proofchain_storage::{MemoryStore, SledStore};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn, Level};

use crate::{
    api::AppState,
    config::LedgerArgs,
    constants::{DEFAULT_DATA_DIR, DEFAULT_LISTEN},
};

#[derive(Parser, Debug)]
#[command(name = "proofchain-node", about = "Serve a proof-of-work ledger over HTTP")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Data directory for sled
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Keep the chain in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Static assets served for paths outside the API
    #[arg(long, env = "PUBLIC_DIR")]
    public_dir: Option<PathBuf>,

    #[command(flatten)]
    ledger: LedgerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = LedgerConfig::from(args.ledger);

    let store: Arc<dyn ChainStore> = if args.ephemeral {
        info!("using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let store = SledStore::open(&args.data_dir)
            .with_context(|| format!("opening store at {}", args.data_dir.display()))?;
        Arc::new(store)
    };

    let chain = Chain::init(store.as_ref(), config)?;
    if let Err(err) = chain.validate_chain() {
        warn!("stored chain failed validation: {err}");
    }
    info!(
        height = chain.last_block().index,
        nodes = chain.nodes().len(),
        "ledger ready"
    );

    let app = api::router(AppState::new(chain, store), args.public_dir.as_deref());

    let addr: SocketAddr = args.listen.parse()?;
    info!("proofchain-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("proofchain-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
