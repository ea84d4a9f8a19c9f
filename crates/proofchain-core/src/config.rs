use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Raw digest size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            Self::Sha256 => SHA256_OUTPUT_SIZE,
            Self::Sha512 => SHA512_OUTPUT_SIZE,
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(format!("unsupported hash algorithm {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestEncoding {
    #[default]
    Hex,
    Base64,
}

impl DigestEncoding {
    /// Length of an encoded digest of `bytes` raw bytes.
    pub fn encoded_len(self, bytes: usize) -> usize {
        match self {
            Self::Hex => bytes * 2,
            Self::Base64 => bytes.div_ceil(3) * 4,
        }
    }
}

impl std::str::FromStr for DigestEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(format!("unsupported digest encoding {other:?}")),
        }
    }
}

/// Every tunable of the ledger engine. Transport settings live in the binaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub hash_algorithm: HashAlgorithm,
    pub secret: String,
    pub encoding: DigestEncoding,
    /// Resolution hash length before any chain weight is added.
    pub resolution_match_length: usize,
    /// Extra resolution characters per block of chain length.
    pub chain_weight_factor: f64,
    /// Derive the resolution hash from the last block instead of genesis.
    pub advance_block: bool,
    pub require_proof: bool,
    pub zero_address: String,
    pub proof_seed: String,
    pub genesis_proof: String,
    pub genesis_data: Value,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            secret: DEFAULT_SECRET.to_string(),
            encoding: DigestEncoding::default(),
            resolution_match_length: DEFAULT_RESOLUTION_MATCH_LENGTH,
            chain_weight_factor: DEFAULT_CHAIN_WEIGHT_FACTOR,
            advance_block: false,
            require_proof: true,
            zero_address: ZERO_NODE_ADDRESS.to_string(),
            proof_seed: DEFAULT_PROOF_SEED.to_string(),
            genesis_proof: GENESIS_PROOF.to_string(),
            genesis_data: Value::Object(Default::default()),
        }
    }
}
