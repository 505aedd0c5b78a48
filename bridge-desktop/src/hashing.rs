//! Thread-backed digest worker.

use bridge_traits::{
    error::{BridgeError, Result},
    file::FileHandle,
    hashing::{DigestAlgorithm, DigestReceiver, DigestWorker},
};
use futures::channel::oneshot;
use sha2::Digest;
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// Bytes read from the file per step.
pub const DEFAULT_READ_CHUNK: u64 = 4 * 1024 * 1024;

/// Hashes each file on its own OS thread.
///
/// The file handle is sent to the thread over a channel, the digest comes back
/// over a oneshot, and the thread exits. Reads are driven on the tokio runtime
/// that was current when the job started, if any.
#[derive(Debug, Clone)]
pub struct ThreadDigestWorker {
    algorithm: DigestAlgorithm,
    read_chunk: u64,
}

impl ThreadDigestWorker {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    pub fn with_read_chunk(mut self, bytes: u64) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }
}

impl Default for ThreadDigestWorker {
    fn default() -> Self {
        Self::new(DigestAlgorithm::Md5)
    }
}

impl DigestWorker for ThreadDigestWorker {
    fn start(&self, file: Arc<dyn FileHandle>) -> DigestReceiver {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (job_tx, job_rx) = mpsc::channel::<Arc<dyn FileHandle>>();

        let algorithm = self.algorithm;
        let read_chunk = self.read_chunk;
        let runtime = Handle::try_current().ok();

        let spawned = thread::Builder::new()
            .name(format!("digest-{}", algorithm))
            .spawn(move || {
                let outcome = match job_rx.recv() {
                    Ok(file) => hash_file(file.as_ref(), algorithm, read_chunk, runtime),
                    Err(_) => Err(BridgeError::OperationFailed(
                        "digest job was never delivered".to_string(),
                    )),
                };
                if reply_tx.send(outcome).is_err() {
                    debug!("Digest receiver dropped before completion");
                }
            });

        match spawned {
            Ok(_) => {
                if job_tx.send(file).is_err() {
                    warn!("Digest thread exited before receiving its job");
                }
            }
            // The reply sender went down with the closure; the receiver
            // observes cancellation.
            Err(e) => error!(error = %e, "Failed to spawn digest thread"),
        }

        reply_rx
    }

    fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

enum Hasher {
    Md5(md5::Md5),
    Sha256(sha2::Sha256),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hex digest of an in-memory buffer.
pub fn digest_hex(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

fn hash_file(
    file: &dyn FileHandle,
    algorithm: DigestAlgorithm,
    read_chunk: u64,
    runtime: Option<Handle>,
) -> Result<String> {
    let size = file.size();
    let mut hasher = Hasher::new(algorithm);
    let mut offset = 0u64;

    while offset < size {
        let read = file.read_range(offset, read_chunk);
        let chunk = match &runtime {
            Some(handle) => handle.block_on(read)?,
            None => futures::executor::block_on(read)?,
        };
        if chunk.is_empty() {
            return Err(BridgeError::OutOfRange { offset, size });
        }
        hasher.update(&chunk);
        offset += chunk.len() as u64;
    }

    debug!(file = file.name(), size, algorithm = %algorithm, "Digest computed");
    Ok(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFile;
    use bridge_traits::hashing::is_hex_digest;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            digest_hex(DigestAlgorithm::Md5, b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Md5, b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Sha256, b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_worker_streams_in_chunks() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = digest_hex(DigestAlgorithm::Md5, &data);

        let worker = ThreadDigestWorker::default().with_read_chunk(1000);
        let digest = worker
            .start(Arc::new(MemoryFile::new("data.bin", data)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(digest, expected);
        assert!(is_hex_digest(&digest, DigestAlgorithm::Md5));
    }

    #[test]
    fn test_worker_without_runtime() {
        let worker = ThreadDigestWorker::new(DigestAlgorithm::Sha256);
        let receiver = worker.start(Arc::new(MemoryFile::new("abc", &b"abc"[..])));
        let digest = futures::executor::block_on(receiver).unwrap().unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
