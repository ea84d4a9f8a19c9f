use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::{
    compute_transaction_hash,
    config::LedgerConfig,
    difficulty::DifficultyPolicy,
    error::{LedgerError, Result},
    genesis_block,
    hasher::Hasher,
    ledger::{TransactionGroups, TransactionLedger},
    next_block, now_millis,
    pow::{validate_proof, BadProofCache},
    Block, Transaction,
};

/// Persistence hooks the chain is loaded from and saved to.
/// This lives in `proofchain-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// The last saved state, or `None` for a fresh store.
    fn load(&self) -> anyhow::Result<Option<ChainState>>;
    /// Replace the saved state with `state`.
    fn save(&self, state: &ChainState) -> anyhow::Result<()>;
}

/// Everything about a chain that outlives the process. The bad-proof cache
/// is not part of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain: Vec<Block>,
    pub transactions: Vec<Transaction>,
    pub nodes: BTreeSet<String>,
}

/// What a miner needs to search for the next proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Index the next block will receive.
    pub index: u64,
    pub last_proof: String,
    pub resolution_hash: String,
    pub length: usize,
}

/// The ledger: blocks, pending transactions, known nodes and the bad-proof cache.
///
/// All mutation goes through `&mut self`; callers sharing a chain must
/// serialize writers themselves.
#[derive(Clone, Debug)]
pub struct Chain {
    config: LedgerConfig,
    hasher: Hasher,
    policy: DifficultyPolicy,
    chain: Vec<Block>,
    transactions: Vec<Transaction>,
    nodes: BTreeSet<String>,
    bad_proofs: BadProofCache,
}

impl Chain {
    /// A chain holding only a fresh genesis block.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let hasher = Hasher::from_config(&config);
        let genesis = genesis_block(&hasher, &config)?;
        Ok(Self::assemble(config, hasher, vec![genesis], vec![], BTreeSet::new()))
    }

    pub fn from_state(state: ChainState, config: LedgerConfig) -> Result<Self> {
        match state.chain.first() {
            Some(genesis) if genesis.index == 0 => {}
            Some(_) => return Err(LedgerError::invalid_block("first block is not genesis")),
            None => return Err(LedgerError::invalid_block("chain has no genesis block")),
        }
        let hasher = Hasher::from_config(&config);
        Ok(Self::assemble(
            config,
            hasher,
            state.chain,
            state.transactions,
            state.nodes,
        ))
    }

    /// Load the chain from `store`, seeding and saving a genesis chain if the
    /// store is empty. Idempotent.
    pub fn init<S: ChainStore + ?Sized>(store: &S, config: LedgerConfig) -> Result<Self> {
        match store.load()? {
            Some(state) => {
                let chain = Self::from_state(state, config)?;
                info!(height = chain.last_block().index, "chain loaded");
                Ok(chain)
            }
            None => {
                let chain = Self::new(config)?;
                store.save(&chain.state())?;
                info!("chain seeded with genesis block");
                Ok(chain)
            }
        }
    }

    fn assemble(
        config: LedgerConfig,
        hasher: Hasher,
        chain: Vec<Block>,
        transactions: Vec<Transaction>,
        mut nodes: BTreeSet<String>,
    ) -> Self {
        nodes.insert(config.zero_address.clone());
        let policy = DifficultyPolicy::new(&config, &hasher);
        Self {
            config,
            hasher,
            policy,
            chain,
            transactions,
            nodes,
            bad_proofs: BadProofCache::default(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    pub fn last_block(&self) -> &Block {
        self.chain.last().expect("chain always holds a genesis block")
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: a chain starts with its genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Transactions recorded since the last block.
    pub fn pending(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    pub fn bad_proofs(&self) -> &BadProofCache {
        &self.bad_proofs
    }

    pub fn state(&self) -> ChainState {
        ChainState {
            chain: self.chain.clone(),
            transactions: self.transactions.clone(),
            nodes: self.nodes.clone(),
        }
    }

    pub fn register_node(&mut self, address: impl Into<String>) -> &BTreeSet<String> {
        let address = address.into();
        if self.nodes.insert(address.clone()) {
            debug!(node = %address, "node registered");
        }
        &self.nodes
    }

    /// Record a pending transfer of block `index` between two registered nodes.
    /// Returns the index the next block will receive, or `None` if either node
    /// is unknown.
    pub fn transaction(&mut self, sender: &str, recipient: &str, index: u64) -> Option<u64> {
        if !self.nodes.contains(sender) || !self.nodes.contains(recipient) {
            return None;
        }
        self.transactions.push(Transaction::new(sender, recipient, index));
        Some(self.last_block().index + 1)
    }

    pub fn resolution_hash_length(&self) -> usize {
        self.policy.resolution_hash_length(&self.chain)
    }

    pub fn resolution_hash(&self) -> Result<String> {
        self.policy.resolution_hash(&self.hasher, &self.chain)
    }

    pub fn challenge(&self) -> Result<Challenge> {
        let resolution_hash = self.resolution_hash()?;
        let last = self.last_block();
        Ok(Challenge {
            index: last.index + 1,
            last_proof: last.proof.clone(),
            length: resolution_hash.len(),
            resolution_hash,
        })
    }

    /// Check `proof` against the current target, remembering failures.
    /// Returns the guess hash on success.
    pub fn validate_proof(&mut self, proof: &str) -> Result<String> {
        if self.bad_proofs.contains(proof) {
            return Err(LedgerError::InvalidProof {
                proof: proof.to_string(),
                memoized: true,
            });
        }
        let resolution_hash = self.resolution_hash()?;
        match validate_proof(&self.hasher, &self.last_block().proof, proof, &resolution_hash) {
            Some(guess) => Ok(guess),
            None => {
                self.bad_proofs.insert(proof);
                Err(LedgerError::InvalidProof {
                    proof: proof.to_string(),
                    memoized: false,
                })
            }
        }
    }

    /// Check that `block` can extend the current tip: hash linkage, index
    /// continuity, transaction hash continuity and proof, in that order.
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        self.check_successor(&self.chain, block)?;
        self.check_proof(&self.chain, block)
    }

    /// Re-verify every block after genesis against its actual predecessor.
    pub fn validate_chain(&self) -> Result<()> {
        for (position, block) in self.chain.iter().enumerate().skip(1) {
            if block.compute_hash(&self.hasher)? != block.this_hash {
                return Err(LedgerError::invalid_block(format!(
                    "block {} content does not match its hash",
                    block.index
                )));
            }
            let prefix = &self.chain[..position];
            self.check_successor(prefix, block)?;
            if self.config.require_proof {
                self.check_proof(prefix, block)?;
            }
        }
        Ok(())
    }

    fn check_successor(&self, prefix: &[Block], block: &Block) -> Result<()> {
        let last = prefix
            .last()
            .ok_or_else(|| LedgerError::invalid_block("chain has no genesis block"))?;
        if block.last_hash != last.this_hash {
            return Err(LedgerError::invalid_block(format!(
                "block {} last hash {} does not match {}",
                block.index, block.last_hash, last.this_hash
            )));
        }
        if block.index != last.index + 1 {
            return Err(LedgerError::invalid_block(format!(
                "block index {} does not follow {}",
                block.index, last.index
            )));
        }
        let transaction_hash =
            compute_transaction_hash(&self.hasher, &block.transactions, &last.transaction_hash)?;
        if block.transaction_hash != transaction_hash {
            return Err(LedgerError::invalid_block(format!(
                "block {} transaction hash does not match its transactions",
                block.index
            )));
        }
        Ok(())
    }

    fn check_proof(&self, prefix: &[Block], block: &Block) -> Result<()> {
        let resolution_hash = self.policy.resolution_hash(&self.hasher, prefix)?;
        let last_proof = prefix.last().map_or("", |last| last.proof.as_str());
        match validate_proof(&self.hasher, last_proof, &block.proof, &resolution_hash) {
            Some(_) => Ok(()),
            None => Err(LedgerError::InvalidProof {
                proof: block.proof.clone(),
                memoized: false,
            }),
        }
    }

    /// Mine the pending transactions into a new block for `node`.
    ///
    /// On success the bad-proof cache is emptied, `node` is registered, the
    /// pending buffer moves into the block and a reward transaction from the
    /// zero address to `node` starts the next buffer. On failure the chain is
    /// unchanged, except that a proof which failed the target is cached.
    pub fn add_block(&mut self, proof: &str, data: Value, node: &str) -> Result<&Block> {
        if proof.is_empty() {
            return Err(LedgerError::MissingField("proof"));
        }
        if node.is_empty() {
            return Err(LedgerError::MissingField("node"));
        }
        if self.config.require_proof && self.bad_proofs.contains(proof) {
            debug!(proof, "proof rejected from cache");
            return Err(LedgerError::InvalidProof {
                proof: proof.to_string(),
                memoized: true,
            });
        }

        let candidate = next_block(
            &self.hasher,
            proof,
            self.last_block(),
            data,
            self.transactions.clone(),
        )?;

        if self.config.require_proof {
            if let Err(err) = self.validate_block(&candidate) {
                match &err {
                    LedgerError::InvalidProof { .. } => {
                        debug!(proof, "proof does not resolve target");
                        self.bad_proofs.insert(proof);
                    }
                    _ => warn!(index = candidate.index, "block rejected: {err}"),
                }
                return Err(err);
            }
        }

        self.bad_proofs.clear();
        self.register_node(node);
        let index = candidate.index;
        self.chain.push(candidate);
        self.transactions.clear();
        self.transactions.push(Transaction {
            sender: self.config.zero_address.clone(),
            recipient: node.to_string(),
            index,
            timestamp: now_millis(),
        });

        info!(index, node, "block added");
        Ok(self.last_block())
    }

    pub fn ledger(&self) -> TransactionLedger<'_> {
        TransactionLedger::new(&self.chain, &self.transactions, &self.config.zero_address)
    }

    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.ledger().all_transactions()
    }

    pub fn transactions_by_sender(&self) -> TransactionGroups<String> {
        self.ledger().transactions_by_sender()
    }

    pub fn transactions_by_recipient(&self) -> TransactionGroups<String> {
        self.ledger().transactions_by_recipient()
    }

    pub fn transactions_by_node(&self) -> TransactionGroups<String> {
        self.ledger().transactions_by_node()
    }

    pub fn transactions_by_index(&self) -> TransactionGroups<u64> {
        self.ledger().transactions_by_index()
    }

    pub fn transactions_for_node(&self, node: &str) -> Vec<Transaction> {
        self.ledger().transactions_for_node(node)
    }

    pub fn transactions_for_index(&self, index: u64) -> Vec<Transaction> {
        self.ledger().transactions_for_index(index)
    }

    pub fn owner(&self, index: u64, trace: bool) -> String {
        self.ledger().owner(index, trace)
    }

    pub fn wallet(&self, node: &str, trace: bool) -> Vec<&Block> {
        self.ledger().wallet(node, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mine::solve_proof;
    use serde_json::json;
    use std::sync::Mutex;

    fn solve(chain: &Chain) -> String {
        let challenge = chain.challenge().unwrap();
        solve_proof(
            chain.hasher(),
            &challenge.last_proof,
            &challenge.resolution_hash,
            0..u64::MAX,
        )
        .unwrap()
        .proof
    }

    fn bad_proof(chain: &Chain) -> String {
        let challenge = chain.challenge().unwrap();
        (0u64..)
            .map(|n| format!("bad-{n}"))
            .find(|proof| {
                validate_proof(
                    chain.hasher(),
                    &challenge.last_proof,
                    proof,
                    &challenge.resolution_hash,
                )
                .is_none()
            })
            .unwrap()
    }

    fn mine(chain: &mut Chain, node: &str) -> u64 {
        let proof = solve(chain);
        chain.add_block(&proof, json!({ "by": node }), node).unwrap().index
    }

    #[derive(Default)]
    struct TestStore {
        state: Mutex<Option<ChainState>>,
        saves: Mutex<usize>,
    }

    impl ChainStore for TestStore {
        fn load(&self) -> anyhow::Result<Option<ChainState>> {
            Ok(self.state.lock().unwrap().clone())
        }

        fn save(&self, state: &ChainState) -> anyhow::Result<()> {
            *self.state.lock().unwrap() = Some(state.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn fresh_chain_holds_genesis() {
        let chain = Chain::new(LedgerConfig::default()).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.last_block().index, 0);
        assert!(chain.nodes().contains("0"));
        assert!(chain.pending().is_empty());
        assert!(chain.validate_chain().is_ok());
    }

    #[test]
    fn alice_mines_first_block() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let proof = solve(&chain);
        let block = chain.add_block(&proof, json!({ "name": "moon" }), "alice").unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.proof, proof);
        assert_eq!(chain.len(), 2);
        assert!(chain.nodes().contains("alice"));
        assert_eq!(chain.pending().len(), 1);
        let reward = &chain.pending()[0];
        assert_eq!(reward.sender, "0");
        assert_eq!(reward.recipient, "alice");
        assert_eq!(reward.index, 1);
    }

    #[test]
    fn chain_links_and_indexes_hold() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        for node in ["alice", "bob", "alice", "carol", "bob"] {
            mine(&mut chain, node);
        }
        let blocks = chain.blocks();
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index, i as u64);
            if i > 0 {
                assert_eq!(block.last_hash, blocks[i - 1].this_hash);
            }
        }
        assert!(chain.validate_chain().is_ok());
    }

    #[test]
    fn pending_transactions_move_into_the_next_block() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        mine(&mut chain, "alice");
        chain.register_node("bob");
        assert_eq!(chain.transaction("alice", "bob", 1), Some(2));
        let pending = chain.pending().to_vec();
        assert_eq!(pending.len(), 2);
        mine(&mut chain, "carol");
        assert_eq!(chain.blocks()[2].transactions, pending);
        assert_eq!(chain.pending().len(), 1);
        assert_eq!(chain.pending()[0].recipient, "carol");
    }

    #[test]
    fn empty_proof_or_node_is_rejected_up_front() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        assert!(matches!(
            chain.add_block("", json!({}), "alice"),
            Err(LedgerError::MissingField("proof"))
        ));
        assert!(matches!(
            chain.add_block("abc", json!({}), ""),
            Err(LedgerError::MissingField("node"))
        ));
        assert_eq!(chain.len(), 1);
        assert!(chain.bad_proofs().is_empty());
    }

    #[test]
    fn bad_proof_is_memoized_then_cleared() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let bad = bad_proof(&chain);

        let err = chain.add_block(&bad, json!({}), "alice").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof { memoized: false, .. }));
        assert!(chain.bad_proofs().contains(&bad));
        assert_eq!(chain.len(), 1);

        // second attempt never reaches the hasher
        let err = chain.add_block(&bad, json!({}), "alice").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof { memoized: true, .. }));
        let err = chain.validate_proof(&bad).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof { memoized: true, .. }));
        assert_eq!(chain.len(), 1);
        assert!(chain.pending().is_empty());

        mine(&mut chain, "alice");
        assert!(chain.bad_proofs().is_empty());
    }

    #[test]
    fn validate_proof_caches_failures_only() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let good = solve(&chain);
        assert!(chain.validate_proof(&good).is_ok());
        assert!(chain.bad_proofs().is_empty());
        let bad = bad_proof(&chain);
        assert!(chain.validate_proof(&bad).is_err());
        assert_eq!(chain.bad_proofs().len(), 1);
    }

    #[test]
    fn proof_not_required_accepts_anything() {
        let config = LedgerConfig {
            require_proof: false,
            ..LedgerConfig::default()
        };
        let mut chain = Chain::new(config).unwrap();
        chain.add_block("whatever", json!({}), "alice").unwrap();
        chain.add_block("whatever", json!({}), "bob").unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.validate_chain().is_ok());
    }

    #[test]
    fn validate_block_rejects_broken_links() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        mine(&mut chain, "alice");
        let proof = solve(&chain);
        let hasher = chain.hasher().clone();
        let last = chain.last_block().clone();

        let good = next_block(&hasher, proof, &last, json!({}), chain.pending().to_vec())
            .unwrap();
        assert!(chain.validate_block(&good).is_ok());

        let mut wrong_link = good.clone();
        wrong_link.last_hash = "beef".to_string();
        assert!(matches!(
            chain.validate_block(&wrong_link),
            Err(LedgerError::InvalidBlock { .. })
        ));

        let mut wrong_index = good.clone();
        wrong_index.index = 7;
        assert!(matches!(
            chain.validate_block(&wrong_index),
            Err(LedgerError::InvalidBlock { .. })
        ));

        let mut extra_transaction = good.clone();
        extra_transaction
            .transactions
            .push(Transaction::new("mallory", "mallory", last.index));
        assert!(matches!(
            chain.validate_block(&extra_transaction),
            Err(LedgerError::InvalidBlock { .. })
        ));

        let mut wrong_transaction_hash = good.clone();
        wrong_transaction_hash.transaction_hash = "beef".to_string();
        assert!(matches!(
            chain.validate_block(&wrong_transaction_hash),
            Err(LedgerError::InvalidBlock { .. })
        ));
    }

    #[test]
    fn validate_chain_detects_tampering() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        mine(&mut chain, "alice");
        mine(&mut chain, "bob");
        let mut state = chain.state();
        state.chain[1].data = json!({ "by": "mallory" });
        let tampered = Chain::from_state(state, LedgerConfig::default()).unwrap();
        assert!(matches!(
            tampered.validate_chain(),
            Err(LedgerError::InvalidBlock { .. })
        ));
    }

    #[test]
    fn validate_chain_checks_historic_proofs() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let bad = bad_proof(&chain);
        mine(&mut chain, "alice");
        // the content hash excludes the proof, so only the proof check can catch this
        let mut state = chain.state();
        state.chain[1].proof = bad;
        let replaced = Chain::from_state(state, chain.config().clone()).unwrap();
        assert!(matches!(
            replaced.validate_chain(),
            Err(LedgerError::InvalidProof { .. })
        ));
    }

    #[test]
    fn two_miners_and_wallets() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let first = mine(&mut chain, "alice");
        let second = mine(&mut chain, "bob");
        let third = mine(&mut chain, "alice");
        assert!(first < second && second < third);
        assert_eq!(chain.len(), 4);

        let alice: Vec<u64> = chain.wallet("alice", true).iter().map(|b| b.index).collect();
        let bob: Vec<u64> = chain.wallet("bob", true).iter().map(|b| b.index).collect();
        assert_eq!(alice, vec![1, 3]);
        assert_eq!(bob, vec![2]);
        for index in 1..=3 {
            let owner = chain.owner(index, true);
            assert!(alice.contains(&index) == (owner == "alice"));
        }
    }

    #[test]
    fn transfers_move_quick_ownership() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        mine(&mut chain, "alice");
        chain.register_node("bob");
        chain.transaction("alice", "bob", 1).unwrap();
        assert_eq!(chain.owner(1, false), "bob");
        assert_eq!(chain.owner(1, true), "alice");
        assert_eq!(chain.owner(2, false), "0");
        assert_eq!(chain.transactions_for_node("bob").len(), 1);
        assert_eq!(chain.transactions_by_index()[&1].len(), 2);
    }

    #[test]
    fn transaction_requires_known_nodes() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        assert_eq!(chain.transaction("0", "stranger", 0), None);
        assert!(chain.pending().is_empty());
        chain.register_node("stranger");
        assert_eq!(chain.transaction("0", "stranger", 0), Some(1));
    }

    #[test]
    fn register_node_is_idempotent() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        chain.register_node("alice");
        let nodes = chain.register_node("alice");
        assert_eq!(nodes.iter().filter(|n| *n == "alice").count(), 1);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn challenge_tracks_tip_and_difficulty() {
        let mut chain = Chain::new(LedgerConfig::default()).unwrap();
        let before = chain.challenge().unwrap();
        assert_eq!(before.index, 1);
        assert_eq!(before.last_proof, chain.config().genesis_proof);
        assert_eq!(before.length, chain.resolution_hash_length());
        for _ in 0..4 {
            mine(&mut chain, "alice");
        }
        let after = chain.challenge().unwrap();
        assert_eq!(after.index, 5);
        assert!(after.length > before.length);
        // genesis-referenced targets only ever extend
        assert!(after.resolution_hash.starts_with(&before.resolution_hash));
    }

    #[test]
    fn init_seeds_then_loads() {
        let store = TestStore::default();
        let mut chain = Chain::init(&store, LedgerConfig::default()).unwrap();
        assert_eq!(*store.saves.lock().unwrap(), 1);
        mine(&mut chain, "alice");
        store.save(&chain.state()).unwrap();

        let loaded = Chain::init(&store, LedgerConfig::default()).unwrap();
        assert_eq!(*store.saves.lock().unwrap(), 2);
        assert_eq!(loaded.state(), chain.state());
        assert!(loaded.bad_proofs().is_empty());
        assert!(loaded.validate_chain().is_ok());
    }

    #[test]
    fn from_state_rejects_missing_genesis() {
        let state = ChainState {
            chain: vec![],
            transactions: vec![],
            nodes: BTreeSet::new(),
        };
        assert!(Chain::from_state(state, LedgerConfig::default()).is_err());
    }
}
