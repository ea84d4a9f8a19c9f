use anyhow::{Context, Result};
use proofchain_core::{Block, ChainState, ChainStore, Transaction};
use serde::de::DeserializeOwned;
use sled::{Batch, Db, IVec, Tree};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";
const KEY_PENDING: &[u8] = b"pending";
const KEY_NODES: &[u8] = b"nodes";

/// Blocks live in their own tree keyed by big-endian index, so iteration is
/// chain order. Pending transactions, nodes and the tip live in the default tree.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled store at {}", path.display()))?;
    info!("sled store opened");
    Ok(Self { db })
  }

  fn blocks(&self) -> Result<Tree> {
    self.db.open_tree(TREE_BLOCKS).context("opening blocks tree")
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
    let tree = self.blocks()?;
    let key = index.to_be_bytes();
    tree
      .get(key)?
      .map(|ivec: IVec| decode(&ivec).with_context(|| format!("decoding block {index}")))
      .transpose()
  }

  pub fn block_count(&self) -> Result<u64> {
    Ok(self.blocks()?.len() as u64)
  }

  pub fn tip_height(&self) -> Result<u64> {
    let Some(value) = self.db.get(KEY_TIP_HEIGHT)? else {
      return Ok(0);
    };
    let bytes = <[u8; 8]>::try_from(&*value)
      .with_context(|| format!("tip height has {} bytes, expected 8", value.len()))?;
    Ok(u64::from_be_bytes(bytes))
  }

  pub fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("tip hash is not utf-8"))
      .transpose()
  }

  /// Remove every block and all chain metadata.
  pub fn clear(&self) -> Result<()> {
    self.blocks()?.clear()?;
    self.db.clear()?;
    self.db.flush()?;
    Ok(())
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }

  fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
    self
      .db
      .get(key)?
      .map(|v| decode(&v).with_context(|| format!("decoding {}", String::from_utf8_lossy(key))))
      .transpose()
  }

  /// Number of stored blocks that agree with `chain`. Anything past that
  /// point has to be (re)written.
  fn common_prefix(&self, chain: &[Block]) -> Result<usize> {
    let stored = self.block_count()? as usize;
    if stored == 0 || stored > chain.len() {
      return Ok(0);
    }
    let agrees = self
      .get_block(stored as u64 - 1)?
      .is_some_and(|block| block.this_hash == chain[stored - 1].this_hash);
    Ok(if agrees { stored } else { 0 })
  }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
  Ok(serde_json::from_slice(bytes)?)
}

impl ChainStore for SledStore {
  fn load(&self) -> Result<Option<ChainState>> {
    let tree = self.blocks()?;
    if tree.is_empty() {
      return Ok(None);
    }
    let chain = tree
      .iter()
      .values()
      .map(|value| decode::<Block>(&value?))
      .collect::<Result<Vec<_>>>()
      .context("loading blocks")?;
    let transactions: Vec<Transaction> = self.get_json(KEY_PENDING)?.unwrap_or_default();
    let nodes: BTreeSet<String> = self.get_json(KEY_NODES)?.unwrap_or_default();
    info!(blocks = chain.len(), "chain state loaded from sled");
    Ok(Some(ChainState {
      chain,
      transactions,
      nodes,
    }))
  }

  fn save(&self, state: &ChainState) -> Result<()> {
    let tree = self.blocks()?;
    let common = self.common_prefix(&state.chain)?;

    // Stale blocks go out in the same batch the replacements come in, so a
    // crash never leaves the tree empty.
    let mut blocks = Batch::default();
    if common == 0 && !tree.is_empty() {
      warn!("stored chain diverges from the saved state; rewriting all blocks");
      for key in tree.iter().keys() {
        blocks.remove(key?);
      }
    }
    for block in &state.chain[common..] {
      blocks.insert(block.index.to_be_bytes().to_vec(), serde_json::to_vec(block)?);
    }
    tree.apply_batch(blocks).context("writing blocks")?;

    let mut meta = Batch::default();
    if let Some(tip) = state.chain.last() {
      meta.insert(KEY_TIP_HEIGHT, tip.index.to_be_bytes().to_vec());
      meta.insert(KEY_TIP_HASH, tip.this_hash.as_bytes());
    }
    meta.insert(KEY_PENDING, serde_json::to_vec(&state.transactions)?);
    meta.insert(KEY_NODES, serde_json::to_vec(&state.nodes)?);
    self.db.apply_batch(meta).context("writing chain metadata")?;

    self.db.flush()?;
    Ok(())
  }
}
