use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use proofchain_core::{Block, Chain, ChainStore, Challenge, LedgerError, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{path::Path as FsPath, sync::Arc};
use tokio::sync::RwLock;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::error;

use crate::constants::{API_BASE, INDEX_FILE};

/// Shared handle to the one chain this node serves.
///
/// Readers share the lock. A writer holds it while it applies a change to a
/// copy, saves the copy and swaps it in, so readers never see unsaved state.
#[derive(Clone)]
pub struct AppState {
    chain: Arc<RwLock<Chain>>,
    store: Arc<dyn ChainStore>,
}

impl AppState {
    pub fn new(chain: Chain, store: Arc<dyn ChainStore>) -> Self {
        Self {
            chain: Arc::new(RwLock::new(chain)),
            store,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Ledger(err @ LedgerError::MissingField(_)) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            Self::Ledger(err) if err.is_rejection() => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            Self::Ledger(err) => {
                error!("ledger failure: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::Internal(err) => {
                error!("internal failure: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// A block as served over HTTP: the block plus its resolved owner.
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnedBlock {
    #[serde(flatten)]
    pub block: Block,
    pub owner: String,
}

impl OwnedBlock {
    fn new(chain: &Chain, block: &Block) -> Self {
        Self {
            owner: chain.owner(block.index, false),
            block: block.clone(),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct BlocksOut {
    blocks: Vec<OwnedBlock>,
}

#[derive(Serialize)]
struct BlockOut {
    block: OwnedBlock,
}

#[derive(Serialize)]
struct NodeWallet {
    node: String,
    wallet: Vec<Block>,
}

#[derive(Serialize)]
struct NodesOut {
    nodes: Vec<NodeWallet>,
}

#[derive(Serialize)]
struct WalletOut {
    wallet: Vec<Block>,
}

#[derive(Serialize)]
struct TransactionsOut {
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct ProofIn {
    #[serde(default)]
    proof: Value,
    #[serde(default)]
    node: String,
    #[serde(default = "empty_payload")]
    data: Value,
}

fn empty_payload() -> Value {
    json!({})
}

#[derive(Deserialize)]
struct TransactionIn {
    sender: String,
    recipient: String,
    index: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionAccepted {
    next_index: u64,
}

/// Miners may send proofs as strings or bare numbers.
fn proof_text(proof: &Value) -> String {
    match proof {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn router(state: AppState, public_dir: Option<&FsPath>) -> Router {
    let api = Router::new()
        .route("/blocks", get(list_blocks))
        .route("/blocks/{index}", get(get_block))
        .route("/wallets", get(list_wallets))
        .route("/wallets/{node}", get(get_wallet))
        .route("/validate", post(submit_proof))
        .route("/challenge", get(get_challenge))
        .route("/transactions", get(list_transactions).post(submit_transaction))
        .route("/transactions/{node}", get(node_transactions));

    let mut app = Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .nest(API_BASE, api)
        .with_state(state);

    if let Some(dir) = public_dir {
        let assets = ServeDir::new(dir).fallback(ServeFile::new(dir.join(INDEX_FILE)));
        app = app.fallback_service(assets);
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn list_blocks(State(state): State<AppState>) -> ApiResult<BlocksOut> {
    let chain = state.chain.read().await;
    let blocks = chain
        .blocks()
        .iter()
        .skip(1)
        .map(|block| OwnedBlock::new(&chain, block))
        .collect();
    Ok(Json(BlocksOut { blocks }))
}

async fn get_block(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> ApiResult<BlockOut> {
    let chain = state.chain.read().await;
    let block = chain
        .block(index)
        .ok_or_else(|| ApiError::NotFound(format!("block {index}")))?;
    Ok(Json(BlockOut {
        block: OwnedBlock::new(&chain, block),
    }))
}

async fn list_wallets(State(state): State<AppState>) -> ApiResult<NodesOut> {
    let chain = state.chain.read().await;
    let nodes = chain
        .nodes()
        .iter()
        .map(|node| NodeWallet {
            node: node.clone(),
            wallet: chain.wallet(node, true).into_iter().cloned().collect(),
        })
        .collect();
    Ok(Json(NodesOut { nodes }))
}

async fn get_wallet(State(state): State<AppState>, Path(node): Path<String>) -> ApiResult<WalletOut> {
    let chain = state.chain.read().await;
    let wallet = chain.wallet(&node, true).into_iter().cloned().collect();
    Ok(Json(WalletOut { wallet }))
}

async fn get_challenge(State(state): State<AppState>) -> ApiResult<Challenge> {
    let chain = state.chain.read().await;
    Ok(Json(chain.challenge()?))
}

async fn submit_proof(
    State(state): State<AppState>,
    Json(body): Json<ProofIn>,
) -> ApiResult<BlockOut> {
    let proof = proof_text(&body.proof);
    if proof.is_empty() {
        return Err(LedgerError::MissingField("proof").into());
    }
    if body.node.is_empty() {
        return Err(LedgerError::MissingField("node").into());
    }

    let mut chain = state.chain.write().await;
    let mut next = chain.clone();
    let added = next.add_block(&proof, body.data, &body.node).cloned();
    let block = match added {
        Ok(block) => block,
        Err(err) => {
            // A rejection leaves the chain as it was apart from the bad-proof cache.
            *chain = next;
            return Err(err.into());
        }
    };
    persist(&state.store, &next).await?;
    *chain = next;
    Ok(Json(BlockOut {
        block: OwnedBlock::new(&chain, &block),
    }))
}

/// Save `next` before it replaces the served chain. Sled flushes block, so the
/// save runs on the blocking pool while the caller keeps the write lock.
async fn persist(store: &Arc<dyn ChainStore>, next: &Chain) -> Result<(), ApiError> {
    let store = Arc::clone(store);
    let snapshot = next.state();
    tokio::task::spawn_blocking(move || store.save(&snapshot))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(())
}

async fn list_transactions(State(state): State<AppState>) -> ApiResult<TransactionsOut> {
    let chain = state.chain.read().await;
    Ok(Json(TransactionsOut {
        transactions: chain.all_transactions(),
    }))
}

async fn node_transactions(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> ApiResult<TransactionsOut> {
    let chain = state.chain.read().await;
    Ok(Json(TransactionsOut {
        transactions: chain.transactions_for_node(&node),
    }))
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(body): Json<TransactionIn>,
) -> ApiResult<TransactionAccepted> {
    let mut chain = state.chain.write().await;
    let mut next = chain.clone();
    let next_index = next
        .transaction(&body.sender, &body.recipient, body.index)
        .ok_or_else(|| {
            let unknown = if chain.nodes().contains(&body.sender) {
                body.recipient.clone()
            } else {
                body.sender.clone()
            };
            LedgerError::UnknownNode(unknown)
        })?;
    persist(&state.store, &next).await?;
    *chain = next;
    Ok(Json(TransactionAccepted { next_index }))
}
