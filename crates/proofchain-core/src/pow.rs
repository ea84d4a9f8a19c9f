use std::collections::HashSet;

use crate::hasher::Hasher;

/// Check `proof` against `resolution_hash`.
///
/// The guess is the keyed hash of the raw concatenation `last_proof + proof`.
/// Returns the guess when it starts with `resolution_hash`, `None` otherwise.
pub fn validate_proof(
    hasher: &Hasher,
    last_proof: &str,
    proof: &str,
    resolution_hash: &str,
) -> Option<String> {
    let guess = hasher.hash_raw(format!("{last_proof}{proof}").as_bytes());
    guess.starts_with(resolution_hash).then_some(guess)
}

/// Proofs already known to fail against the current resolution hash.
///
/// Entries are only meaningful for the target they were checked against;
/// the owner must call [`BadProofCache::clear`] whenever that target moves.
#[derive(Clone, Debug, Default)]
pub struct BadProofCache {
    proofs: HashSet<String>,
}

impl BadProofCache {
    pub fn contains(&self, proof: &str) -> bool {
        self.proofs.contains(proof)
    }

    pub fn insert(&mut self, proof: impl Into<String>) {
        self.proofs.insert(proof.into());
    }

    pub fn clear(&mut self) {
        self.proofs.clear();
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}
