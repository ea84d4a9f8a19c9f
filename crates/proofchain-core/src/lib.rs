pub mod chain;
pub mod config;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod hasher;
pub mod ledger;
pub mod mine;
pub mod pow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{Chain, ChainState, ChainStore, Challenge};
pub use config::{DigestEncoding, HashAlgorithm, LedgerConfig};
pub use error::{LedgerError, Result};
pub use hasher::Hasher;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A transfer of block ownership between two node addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    /// Index of the block the transaction refers to.
    pub index: u64,
    pub timestamp: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, index: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            index,
            timestamp: now_millis(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub proof: String,
    /// Opaque payload supplied by the miner.
    pub data: Value,
    pub last_hash: String,
    /// Content hash, fixed when the block is built.
    pub this_hash: String,
    /// Transactions recorded between the previous block and this one.
    pub transactions: Vec<Transaction>,
    pub transaction_hash: String,
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hasher: &Hasher,
        proof: impl Into<String>,
        data: Value,
        index: u64,
        last_hash: impl Into<String>,
        timestamp: u64,
        transaction_hash: impl Into<String>,
        transactions: Vec<Transaction>,
    ) -> Result<Self> {
        let last_hash = last_hash.into();
        let this_hash = content_hash(hasher, index, timestamp, &data, &last_hash)?;
        Ok(Self {
            index,
            timestamp,
            proof: proof.into(),
            data,
            last_hash,
            this_hash,
            transactions,
            transaction_hash: transaction_hash.into(),
        })
    }

    /// Recompute the content hash from the block's fields. A block whose
    /// `this_hash` differs from this has been altered after construction.
    pub fn compute_hash(&self, hasher: &Hasher) -> Result<String> {
        content_hash(hasher, self.index, self.timestamp, &self.data, &self.last_hash)
    }
}

fn content_hash(
    hasher: &Hasher,
    index: u64,
    timestamp: u64,
    data: &Value,
    last_hash: &str,
) -> Result<String> {
    let data = serde_json::to_string(data)?;
    hasher.hash(&format!("{index}{timestamp}{data}{last_hash}"))
}

/// The seed block every chain starts from.
pub fn genesis_block(hasher: &Hasher, config: &LedgerConfig) -> Result<Block> {
    Block::new(
        hasher,
        config.genesis_proof.clone(),
        config.genesis_data.clone(),
        0,
        constants::GENESIS_LAST_HASH,
        now_millis(),
        constants::GENESIS_TRANSACTION_HASH,
        vec![],
    )
}

/// Candidate successor of `last_block` carrying `transactions`.
pub fn next_block(
    hasher: &Hasher,
    proof: impl Into<String>,
    last_block: &Block,
    data: Value,
    transactions: Vec<Transaction>,
) -> Result<Block> {
    let transaction_hash =
        compute_transaction_hash(hasher, &transactions, &last_block.transaction_hash)?;
    Block::new(
        hasher,
        proof,
        data,
        last_block.index + 1,
        last_block.this_hash.clone(),
        now_millis(),
        transaction_hash,
        transactions,
    )
}

/// Rolling transaction hash: `H(H(json(transactions)) + last_hash)`.
pub fn compute_transaction_hash(
    hasher: &Hasher,
    transactions: &[Transaction],
    last_hash: &str,
) -> Result<String> {
    let batch = serde_json::to_string(transactions)?;
    let batch_hash = hasher.hash(&batch)?;
    hasher.hash(&format!("{batch_hash}{last_hash}"))
}
