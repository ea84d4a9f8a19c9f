use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::info;

use crate::{hasher::Hasher, pow::validate_proof};

/// A proof that resolves a target, and the guess hash it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub proof: String,
    pub hash: String,
    pub counter: u64,
}

/// Proofs are lowercase hexadecimal renderings of a counter.
pub fn proof_for_counter(counter: u64) -> String {
    format!("{counter:x}")
}

/// Searches `counters` in parallel for a proof whose guess hash starts with
/// `resolution_hash`. Any match is returned, not necessarily the lowest one.
pub fn solve_proof(
    hasher: &Hasher,
    last_proof: &str,
    resolution_hash: &str,
    counters: Range<u64>,
) -> Option<Solution> {
    let found = counters.into_par_iter().find_map_any(|counter| {
        let proof = proof_for_counter(counter);
        validate_proof(hasher, last_proof, &proof, resolution_hash).map(|hash| Solution {
            proof,
            hash,
            counter,
        })
    });

    if let Some(solution) = &found {
        info!(
            "Resolved target {} with proof {} (hash {})",
            resolution_hash, solution.proof, solution.hash
        );
    }
    found
}
