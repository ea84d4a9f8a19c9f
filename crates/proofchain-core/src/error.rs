use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Failures surfaced by the ledger engine. None of them are retried internally.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The guess hash of `last_proof + proof` does not match the resolution hash.
    /// `memoized` is set when the proof was rejected from the bad-proof cache
    /// without hashing.
    #[error("invalid proof {proof:?}")]
    InvalidProof { proof: String, memoized: bool },

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown node {0:?}")]
    UnknownNode(String),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub(crate) fn invalid_block(reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            reason: reason.into(),
        }
    }

    /// Rejections a caller can resolve by resubmitting different input.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidProof { .. } | Self::InvalidBlock { .. } | Self::UnknownNode(_)
        )
    }
}
