//! Resolution targets derived from chain length.
//!
//! The target for the next block is a prefix of `H(reference.this_hash + seed)`.
//! Its length grows with the chain, so each block is harder to resolve than
//! the last. `reference` is genesis unless `advance_block` is set, in which
//! case the target moves with the tip.

use crate::{config::LedgerConfig, error::LedgerError, hasher::Hasher, Block, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct DifficultyPolicy {
    base_match_length: usize,
    chain_weight_factor: f64,
    advance_block: bool,
    proof_seed: String,
    /// Upper bound on the target length: the hasher's digest length.
    max_length: usize,
}

impl DifficultyPolicy {
    pub fn new(config: &LedgerConfig, hasher: &Hasher) -> Self {
        Self {
            base_match_length: config.resolution_match_length,
            chain_weight_factor: config.chain_weight_factor,
            advance_block: config.advance_block,
            proof_seed: config.proof_seed.clone(),
            max_length: hasher.output_len(),
        }
    }

    /// `floor((last.index + 1) * factor)`. Negative factors count as zero.
    pub fn chain_weight(&self, blocks: &[Block]) -> usize {
        let length = blocks.last().map_or(0, |block| block.index + 1);
        (length as f64 * self.chain_weight_factor).floor().max(0.0) as usize
    }

    /// Number of leading characters a proof's guess hash must share with the
    /// resolution hash. Never longer than a digest.
    pub fn resolution_hash_length(&self, blocks: &[Block]) -> usize {
        self.base_match_length
            .saturating_add(self.chain_weight(blocks))
            .min(self.max_length)
    }

    pub fn resolution_hash(&self, hasher: &Hasher, blocks: &[Block]) -> Result<String> {
        let reference = if self.advance_block {
            blocks.last()
        } else {
            blocks.first()
        }
        .ok_or_else(|| LedgerError::invalid_block("chain has no genesis block"))?;

        let mut target = hasher.hash(&format!("{}{}", reference.this_hash, self.proof_seed))?;
        target.truncate(self.resolution_hash_length(blocks));
        Ok(target)
    }
}
