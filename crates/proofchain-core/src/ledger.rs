//! Read-only views over the transactions recorded in blocks and the pending buffer.
//!
//! Ownership is never stored. It is replayed from transactions: a reward
//! transaction from the zero address marks the miner, later transfers move
//! the block along.

use std::collections::BTreeMap;

use crate::{Block, Transaction};

pub type TransactionGroups<K> = BTreeMap<K, Vec<Transaction>>;

#[derive(Clone, Copy, Debug)]
pub struct TransactionLedger<'a> {
    blocks: &'a [Block],
    pending: &'a [Transaction],
    zero_address: &'a str,
}

impl<'a> TransactionLedger<'a> {
    pub fn new(blocks: &'a [Block], pending: &'a [Transaction], zero_address: &'a str) -> Self {
        Self {
            blocks,
            pending,
            zero_address,
        }
    }

    /// Every recorded and pending transaction, oldest first. Equal timestamps
    /// keep chain order, with the pending buffer last.
    pub fn all_transactions(&self) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .chain(self.pending.iter())
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| tx.timestamp);
        transactions
    }

    pub fn transactions_by_sender(&self) -> TransactionGroups<String> {
        group_by(self.all_transactions(), |tx| tx.sender.clone())
    }

    pub fn transactions_by_recipient(&self) -> TransactionGroups<String> {
        group_by(self.all_transactions(), |tx| tx.recipient.clone())
    }

    /// Per address, the transactions it sent followed by those it received.
    pub fn transactions_by_node(&self) -> TransactionGroups<String> {
        let mut groups = self.transactions_by_sender();
        for (recipient, received) in self.transactions_by_recipient() {
            groups.entry(recipient).or_default().extend(received);
        }
        groups
    }

    pub fn transactions_by_index(&self) -> TransactionGroups<u64> {
        group_by(self.all_transactions(), |tx| tx.index)
    }

    pub fn transactions_for_node(&self, node: &str) -> Vec<Transaction> {
        let mut transactions = self
            .transactions_by_node()
            .remove(node)
            .unwrap_or_default();
        transactions.sort_by_key(|tx| tx.timestamp);
        transactions
    }

    pub fn transactions_for_index(&self, index: u64) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .all_transactions()
            .into_iter()
            .filter(|tx| tx.index == index)
            .collect();
        transactions.sort_by_key(|tx| tx.timestamp);
        transactions
    }

    /// The node a block index resolves to.
    ///
    /// Without `trace`, the recipient of the most recent transaction, or the
    /// zero address when there is none. With `trace`, the recipient of the
    /// earliest transaction, or an empty address when there is none.
    pub fn owner(&self, index: u64, trace: bool) -> String {
        resolve_owner(&self.transactions_for_index(index), trace, self.zero_address)
    }

    /// Blocks after genesis that resolve to `node`.
    pub fn wallet(&self, node: &str, trace: bool) -> Vec<&'a Block> {
        let mut by_index = self.transactions_by_index();
        self.blocks
            .iter()
            .skip(1)
            .filter(|block| {
                let transactions = by_index.remove(&block.index).unwrap_or_default();
                resolve_owner(&transactions, trace, self.zero_address) == node
            })
            .collect()
    }
}

// `transactions` must already be in timestamp order.
fn resolve_owner(transactions: &[Transaction], trace: bool, zero_address: &str) -> String {
    if trace {
        // TODO: decide whether traced ownership should also resolve to the
        // last recipient, which would make it identical to the untraced owner.
        transactions
            .first()
            .map(|tx| tx.recipient.clone())
            .unwrap_or_default()
    } else {
        transactions
            .last()
            .map_or_else(|| zero_address.to_string(), |tx| tx.recipient.clone())
    }
}

fn group_by<K: Ord>(
    transactions: Vec<Transaction>,
    key: impl Fn(&Transaction) -> K,
) -> TransactionGroups<K> {
    let mut groups = TransactionGroups::new();
    for tx in transactions {
        groups.entry(key(&tx)).or_insert_with(Vec::new).push(tx);
    }
    groups
}
