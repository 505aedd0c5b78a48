//! Channel handlers wired for each upload job.

use crate::progress::{ProgressCallback, ProgressEvent};
use async_trait::async_trait;
use bridge_traits::file::clamp_range;
use bridge_traits::{DigestReceiver, FileHandle, HostValue, ModuleFault};
use bytes::Bytes;
use core_bridge::ChannelHandler;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// Reader
// ============================================================================

/// Answers `(offset, length) -> bytes` from a caller-owned file.
pub struct ReaderChannel {
    file: Arc<dyn FileHandle>,
}

impl ReaderChannel {
    pub fn new(file: Arc<dyn FileHandle>) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ChannelHandler for ReaderChannel {
    async fn handle(&self, args: Vec<HostValue>) -> Result<HostValue, ModuleFault> {
        let (offset, length) = match (
            args.first().and_then(HostValue::as_u64),
            args.get(1).and_then(HostValue::as_u64),
        ) {
            (Some(offset), Some(length)) => (offset, length),
            _ => {
                return Err(ModuleFault::message(
                    "reader expects (offset, length) as non-negative integers",
                ))
            }
        };

        let (offset, length) = clamp_range(self.file.size(), offset, length);
        if length == 0 {
            return Ok(HostValue::Bytes(Bytes::new()));
        }

        trace!(file = self.file.name(), offset, length, "Reading chunk");
        self.file
            .read_range(offset, length)
            .await
            .map(HostValue::Bytes)
            .map_err(|e| {
                warn!(file = self.file.name(), offset, error = %e, "Chunk read failed");
                ModuleFault::message(e.to_string())
            })
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Forwards progress to the caller with non-decreasing `completed_bytes`.
///
/// A report that goes backwards is dropped, unless it carries an error, in
/// which case it is forwarded at the previous high-water mark.
pub struct ProgressChannel {
    callback: Arc<dyn ProgressCallback>,
    high_water: Mutex<Option<u64>>,
}

impl ProgressChannel {
    pub fn new(callback: Arc<dyn ProgressCallback>) -> Self {
        Self {
            callback,
            high_water: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChannelHandler for ProgressChannel {
    async fn handle(&self, args: Vec<HostValue>) -> Result<HostValue, ModuleFault> {
        let Some(mut event) = ProgressEvent::from_args(&args) else {
            warn!(args = args.len(), "Ignoring malformed progress report");
            return Ok(HostValue::Undefined);
        };

        // Held while the callback runs so reports reach it in order.
        let mut high_water = self.high_water.lock();
        match *high_water {
            Some(previous) if event.completed_bytes < previous => {
                if !event.is_error() {
                    trace!(previous, reported = event.completed_bytes, "Dropping progress regression");
                    return Ok(HostValue::Undefined);
                }
                event.completed_bytes = previous;
            }
            _ => *high_water = Some(event.completed_bytes),
        }
        self.callback.on_progress(event);
        Ok(HostValue::Undefined)
    }
}

// ============================================================================
// Hash
// ============================================================================

type SharedDigest = Shared<BoxFuture<'static, Result<String, String>>>;

/// Resolves to the file's content digest.
///
/// The digest worker is started when the channel is created; every invocation
/// awaits the same single result.
pub struct HashChannel {
    digest: SharedDigest,
    invocations: AtomicUsize,
}

impl HashChannel {
    pub fn new(receiver: DigestReceiver) -> Self {
        let digest = receiver
            .map(|outcome| match outcome {
                Ok(Ok(digest)) => Ok(digest),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("digest worker exited without a result".to_string()),
            })
            .boxed()
            .shared();
        Self {
            digest,
            invocations: AtomicUsize::new(0),
        }
    }

    /// How many times the module has asked for the digest.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelHandler for HashChannel {
    async fn handle(&self, _args: Vec<HostValue>) -> Result<HostValue, ModuleFault> {
        let n = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        let digest = self.digest.clone().await.map_err(ModuleFault::message)?;
        debug!(invocation = n, "Digest delivered");
        Ok(HostValue::String(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;
    use futures::channel::oneshot;

    struct MemFile(Bytes);

    #[async_trait]
    impl FileHandle for MemFile {
        fn name(&self) -> &str {
            "mem"
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }

        async fn read_range(&self, offset: u64, length: u64) -> bridge_traits::error::Result<Bytes> {
            let start = offset as usize;
            Ok(self.0.slice(start..start + length as usize))
        }
    }

    #[tokio::test]
    async fn test_reader_clamps_to_file_size() {
        let reader = ReaderChannel::new(Arc::new(MemFile(Bytes::from_static(b"0123456789"))));

        let chunk = reader
            .handle(vec![HostValue::from(6u64), HostValue::from(100u64)])
            .await
            .unwrap();
        assert_eq!(chunk, HostValue::Bytes(Bytes::from_static(b"6789")));

        let past_end = reader
            .handle(vec![HostValue::from(10u64), HostValue::from(4u64)])
            .await
            .unwrap();
        assert_eq!(past_end, HostValue::Bytes(Bytes::new()));

        assert!(reader.handle(vec![HostValue::from("x")]).await.is_err());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channel = ProgressChannel::new(Arc::new({
            let seen = Arc::clone(&seen);
            move |event: ProgressEvent| seen.lock().push((event.completed_bytes, event.error))
        }));

        for completed in [10u64, 30, 20, 30, 40] {
            channel
                .handle(vec![HostValue::from(40u64), HostValue::from(completed), HostValue::Null])
                .await
                .unwrap();
        }
        channel
            .handle(vec![
                HostValue::from(40u64),
                HostValue::from(5u64),
                HostValue::from("connection reset"),
            ])
            .await
            .unwrap();

        let seen = seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (10, None),
                (30, None),
                (30, None),
                (40, None),
                (40, Some("connection reset".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_hash_resolves_once_for_every_caller() {
        let (tx, rx) = oneshot::channel();
        let channel = HashChannel::new(rx);
        tx.send(Ok("900150983cd24fb0d6963f7d28e17f72".to_string()))
            .unwrap();

        let first = channel.handle(vec![]).await.unwrap();
        let second = channel.handle(vec![]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(channel.invocations(), 2);
    }

    #[tokio::test]
    async fn test_hash_failure_becomes_fault() {
        let (tx, rx) = oneshot::channel();
        let channel = HashChannel::new(rx);
        tx.send(Err(BridgeError::OperationFailed("disk gone".to_string())))
            .unwrap();
        assert!(channel.handle(vec![]).await.is_err());

        let (tx, rx) = oneshot::channel::<bridge_traits::error::Result<String>>();
        drop(tx);
        let orphaned = HashChannel::new(rx);
        assert!(orphaned.handle(vec![]).await.is_err());
    }
}
