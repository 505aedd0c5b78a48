//! Content hashing worker contract.
//!
//! Large uploads need a full-content digest that the module requests late in
//! the transfer. Hashing runs off the caller's task on an isolated worker:
//! exactly one file handle goes in, exactly one digest comes out, and the worker
//! terminates afterwards.

use crate::error::{BridgeError, Result};
use crate::file::FileHandle;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Digest algorithm used for upload integrity hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5, 32 hex characters.
    #[default]
    Md5,
    /// SHA-256, 64 hex characters.
    Sha256,
}

impl DigestAlgorithm {
    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(BridgeError::NotAvailable(format!(
                "digest algorithm '{}'",
                other
            ))),
        }
    }
}

/// Receiving end of a digest job: resolves with the hex digest.
pub type DigestReceiver = oneshot::Receiver<Result<String>>;

/// Spawns isolated hashing workers.
pub trait DigestWorker: Send + Sync {
    /// Starts hashing `file` and returns the channel the single digest message
    /// will arrive on.
    fn start(&self, file: Arc<dyn FileHandle>) -> DigestReceiver;

    fn algorithm(&self) -> DigestAlgorithm;
}

/// Returns `true` when `digest` is a lowercase hex string of the expected length.
pub fn is_hex_digest(digest: &str, algorithm: DigestAlgorithm) -> bool {
    digest.len() == algorithm.hex_len()
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_algorithm_parsing() {
        assert_eq!("MD5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!(
            "sha-256".parse::<DigestAlgorithm>().unwrap(),
            DigestAlgorithm::Sha256
        );
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn test_is_hex_digest() {
        assert!(is_hex_digest(
            "d41d8cd98f00b204e9800998ecf8427e",
            DigestAlgorithm::Md5
        ));
        assert!(!is_hex_digest("D41D8CD98F00B204E9800998ECF8427E", DigestAlgorithm::Md5));
        assert!(!is_hex_digest("abc", DigestAlgorithm::Md5));
    }
}
