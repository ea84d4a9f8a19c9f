pub const SHA256_OUTPUT_SIZE: usize = 32;
pub const SHA512_OUTPUT_SIZE: usize = 64;

/// Default HMAC key. Deployments are expected to override it.
pub const DEFAULT_SECRET: &str = "12345";
pub const DEFAULT_RESOLUTION_MATCH_LENGTH: usize = 2;
pub const DEFAULT_CHAIN_WEIGHT_FACTOR: f64 = 0.25;
pub const DEFAULT_PROOF_SEED: &str = "proofchain";

/// Reserved sender of reward transactions, and owner of unclaimed blocks.
pub const ZERO_NODE_ADDRESS: &str = "0";

pub const GENESIS_PROOF: &str = "0";
pub const GENESIS_LAST_HASH: &str = "0";
pub const GENESIS_TRANSACTION_HASH: &str = "0";
