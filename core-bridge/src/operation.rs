//! The closed set of module operations the host relies on.

use std::fmt;
use std::str::FromStr;

/// A known module operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `play(allocationId, remotePath, authTicket, lookupHash, isLive)`
    Play,
    /// `getNextSegment() -> bytes | empty`
    GetNextSegment,
    /// `stop()`
    Stop,
    /// `download(allocationId, remotePath, authTicket, lookupHash, thumbnailOnly, numBlocks, path) -> {url}`
    Download,
    /// `multiUpload(jobListJson) -> {success, error}`
    MultiUpload,
    /// `setWallet(clientId, clientKey, peerPublicKey, publicKey, privateKey, mnemonic, isSplit)`
    SetWallet,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Play,
        Operation::GetNextSegment,
        Operation::Stop,
        Operation::Download,
        Operation::MultiUpload,
        Operation::SetWallet,
    ];

    /// Member name on the module surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Play => "play",
            Operation::GetNextSegment => "getNextSegment",
            Operation::Stop => "stop",
            Operation::Download => "download",
            Operation::MultiUpload => "multiUpload",
            Operation::SetWallet => "setWallet",
        }
    }

    /// Number of arguments the module expects.
    pub fn arity(&self) -> usize {
        match self {
            Operation::Play => 5,
            Operation::GetNextSegment | Operation::Stop => 0,
            Operation::Download => 7,
            Operation::MultiUpload => 1,
            Operation::SetWallet => 7,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for names outside the known operation set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown module operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
