//! Swappable digest functions used to test candidates.
//!
//! MD5 is the deployed default; SHA-256 is available for deployments that
//! want a different target format. Matching compares raw digest bytes so
//! the worker's hot loop never formats hex.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Supported hash functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Length of the lowercase hex encoding of a digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }

    /// Raw digest bytes of a lowercase hex target of this algorithm.
    pub fn decode_target(self, hash: &str) -> Result<Vec<u8>, CoreError> {
        if hash.len() != self.hex_len() {
            return Err(CoreError::Validation(format!(
                "Hash must be {} hex characters for {self}",
                self.hex_len()
            )));
        }
        if hash.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(CoreError::Validation(
                "Hash must contain only lowercase hex characters".to_string(),
            ));
        }
        hex::decode(hash).map_err(|e| CoreError::Validation(format!("Hash is not valid hex: {e}")))
    }

    /// Whether `data` hashes to the raw digest `target`.
    pub fn matches(self, data: &[u8], target: &[u8]) -> bool {
        match self {
            HashAlgorithm::Md5 => Md5::digest(data).as_slice() == target,
            HashAlgorithm::Sha256 => Sha256::digest(data).as_slice() == target,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            other => Err(CoreError::Validation(format!(
                "Unsupported hash algorithm: {other}"
            ))),
        }
    }
}
