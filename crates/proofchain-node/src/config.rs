use clap::{ArgAction, Args};
use proofchain_core::{
    constants::{
        DEFAULT_CHAIN_WEIGHT_FACTOR, DEFAULT_PROOF_SEED, DEFAULT_RESOLUTION_MATCH_LENGTH,
        DEFAULT_SECRET, GENESIS_PROOF, ZERO_NODE_ADDRESS,
    },
    DigestEncoding, HashAlgorithm, LedgerConfig,
};
use serde_json::Value;

/// Ledger settings, each readable from a flag or an environment variable.
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// HMAC digest algorithm (sha256 or sha512)
    #[arg(long, env = "HASH_TYPE", default_value = "sha256")]
    pub hash_algorithm: HashAlgorithm,

    /// HMAC key for every hash on the chain
    #[arg(long, env = "CRYPTO_SECRET", default_value = DEFAULT_SECRET, hide_env_values = true)]
    pub secret: String,

    /// Digest encoding (hex or base64)
    #[arg(long, env = "DIGEST", default_value = "hex")]
    pub encoding: DigestEncoding,

    /// Resolution hash length before chain weight is added
    #[arg(long, env = "RESOLUTION_MATCH_LENGTH", default_value_t = DEFAULT_RESOLUTION_MATCH_LENGTH)]
    pub resolution_match_length: usize,

    /// Extra resolution characters per block of chain length
    #[arg(long, env = "RESOLUTION_CHAIN_WEIGHT", default_value_t = DEFAULT_CHAIN_WEIGHT_FACTOR)]
    pub chain_weight_factor: f64,

    /// Derive the resolution hash from the last block instead of genesis
    #[arg(long, env = "ADVANCE_BLOCK", default_value_t = false, action = ArgAction::Set)]
    pub advance_block: bool,

    /// Reject blocks whose proof does not resolve the target
    #[arg(long, env = "REQUIRE_PROOF", default_value_t = true, action = ArgAction::Set)]
    pub require_proof: bool,

    /// Sender of reward transactions
    #[arg(long, env = "ZERO_NODE_ADDRESS", default_value = ZERO_NODE_ADDRESS)]
    pub zero_address: String,

    #[arg(long, env = "PROOF_SEED", default_value = DEFAULT_PROOF_SEED)]
    pub proof_seed: String,

    #[arg(long, env = "GENESIS_PROOF", default_value = GENESIS_PROOF)]
    pub genesis_proof: String,

    /// Genesis payload as JSON
    #[arg(long, env = "GENESIS_DATA", default_value = "{}", value_parser = parse_json)]
    pub genesis_data: Value,
}

fn parse_json(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

impl From<LedgerArgs> for LedgerConfig {
    fn from(args: LedgerArgs) -> Self {
        Self {
            hash_algorithm: args.hash_algorithm,
            secret: args.secret,
            encoding: args.encoding,
            resolution_match_length: args.resolution_match_length,
            chain_weight_factor: args.chain_weight_factor,
            advance_block: args.advance_block,
            require_proof: args.require_proof,
            zero_address: args.zero_address,
            proof_seed: args.proof_seed,
            genesis_proof: args.genesis_proof,
            genesis_data: args.genesis_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        ledger: LedgerArgs,
    }

    #[test]
    fn defaults_match_ledger_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        let config: LedgerConfig = cli.ledger.into();
        let defaults = LedgerConfig::default();
        assert_eq!(config.hash_algorithm, defaults.hash_algorithm);
        assert_eq!(config.resolution_match_length, defaults.resolution_match_length);
        assert_eq!(config.require_proof, defaults.require_proof);
        assert_eq!(config.zero_address, defaults.zero_address);
        assert_eq!(config.genesis_data, defaults.genesis_data);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--hash-algorithm",
            "sha512",
            "--encoding",
            "base64",
            "--require-proof",
            "false",
            "--genesis-data",
            r#"{"name":"usagi"}"#,
        ])
        .unwrap();
        let config: LedgerConfig = cli.ledger.into();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.encoding, DigestEncoding::Base64);
        assert!(!config.require_proof);
        assert_eq!(config.genesis_data["name"], "usagi");
    }

    #[test]
    fn rejects_bad_genesis_json() {
        assert!(TestCli::try_parse_from(["test", "--genesis-data", "{nope"]).is_err());
    }
}
