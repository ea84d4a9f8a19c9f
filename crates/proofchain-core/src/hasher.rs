//! Keyed hashing used for block fingerprints, transaction hashes and proof guesses.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Sha256, Sha512};

use crate::config::{DigestEncoding, HashAlgorithm, LedgerConfig};
use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// HMAC over a configured algorithm and secret, producing encoded digests.
#[derive(Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    secret: Vec<u8>,
    encoding: DigestEncoding,
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm, secret: impl AsRef<[u8]>, encoding: DigestEncoding) -> Self {
        Self {
            algorithm,
            secret: secret.as_ref().to_vec(),
            encoding,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.hash_algorithm, &config.secret, config.encoding)
    }

    /// Hash the canonical JSON serialization of `data`.
    ///
    /// Strings are serialized too, so `hash("abc")` keys the five bytes `"abc"`
    /// including the quotes.
    pub fn hash<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let json = serde_json::to_string(data)?;
        Ok(self.hash_raw(json.as_bytes()))
    }

    /// Hash `bytes` as-is, without serializing them first.
    pub fn hash_raw(&self, bytes: &[u8]) -> String {
        let digest = match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(&self.secret)
                    .expect("HMAC can take key of any size");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha512 => {
                let mut mac = HmacSha512::new_from_slice(&self.secret)
                    .expect("HMAC can take key of any size");
                mac.update(bytes);
                mac.finalize().into_bytes().to_vec()
            }
        };
        self.encode(&digest)
    }

    /// Length in characters of every digest this hasher produces.
    pub fn output_len(&self) -> usize {
        self.encoding.encoded_len(self.algorithm.output_size())
    }

    fn encode(&self, digest: &[u8]) -> String {
        match self.encoding {
            DigestEncoding::Hex => hex::encode(digest),
            DigestEncoding::Base64 => STANDARD.encode(digest),
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}
