//! Host callback channels addressed by identifier.
//!
//! The module cannot hold host closures, so every callback it needs (chunk
//! readers, progress reporters, hash providers) is registered here under an
//! opaque identifier. The module calls back through [`HostCallDispatch`] with
//! that identifier, and the registry routes the call to the handler.

use crate::error::ChannelError;
use async_trait::async_trait;
use bridge_traits::{HostCallDispatch, HostValue, ModuleFault};
use core_runtime::events::{BridgeEvent, ChannelEvent, EventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Identifier of an upload batch owning a set of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a channel is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    /// `(offset, length) -> bytes`
    Reader,
    /// `(total, completed, error)`
    Progress,
    /// `() -> hexDigest`
    Hash,
}

impl ChannelRole {
    /// Name segment used in the identifier.
    pub fn id_segment(&self) -> &'static str {
        match self {
            ChannelRole::Reader => "upload_reader",
            ChannelRole::Progress => "upload_callback",
            ChannelRole::Hash => "md5_hash",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Reader => "reader",
            ChannelRole::Progress => "progress",
            ChannelRole::Hash => "hash",
        }
    }
}

/// An allocated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: String,
    pub role: ChannelRole,
    pub owner_batch: BatchId,
}

/// Handler attached to a channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, args: Vec<HostValue>) -> Result<HostValue, ModuleFault>;
}

/// Allocation and release counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub readers_allocated: u64,
    pub progress_allocated: u64,
    pub hashes_allocated: u64,
    pub released: u64,
}

impl ChannelStats {
    pub fn allocated(&self) -> u64 {
        self.readers_allocated + self.progress_allocated + self.hashes_allocated
    }

    fn record_allocation(&mut self, role: ChannelRole) {
        match role {
            ChannelRole::Reader => self.readers_allocated += 1,
            ChannelRole::Progress => self.progress_allocated += 1,
            ChannelRole::Hash => self.hashes_allocated += 1,
        }
    }
}

struct ChannelEntry {
    descriptor: ChannelDescriptor,
    /// `None` while the channel is an inert placeholder.
    handler: Option<Arc<dyn ChannelHandler>>,
}

struct RegistryState {
    next_seq: u64,
    entries: HashMap<String, ChannelEntry>,
    stats: ChannelStats,
}

/// Capability table mapping channel identifiers to handlers.
///
/// The registry exclusively owns the identifier namespace. Identifiers are
/// `{prefix}_{role}_{seq}` with a process-wide monotonic sequence, so no two
/// live channels ever share an identifier.
pub struct ChannelRegistry {
    prefix: String,
    state: Mutex<RegistryState>,
    events: Option<EventBus>,
}

impl ChannelRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_start(prefix, 0)
    }

    /// Starts the sequence at `first_seq`.
    pub fn with_start(prefix: impl Into<String>, first_seq: u64) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(RegistryState {
                next_seq: first_seq,
                entries: HashMap::new(),
                stats: ChannelStats::default(),
            }),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Allocates an inert channel for `batch`.
    pub fn allocate(
        &self,
        batch: BatchId,
        role: ChannelRole,
    ) -> Result<ChannelDescriptor, ChannelError> {
        let descriptor = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            let next = seq.checked_add(1).ok_or(ChannelError::Exhausted)?;

            let id = format!("{}_{}_{}", self.prefix, role.id_segment(), seq);
            if state.entries.contains_key(&id) {
                return Err(ChannelError::Collision(id));
            }

            state.next_seq = next;
            state.stats.record_allocation(role);

            let descriptor = ChannelDescriptor {
                id: id.clone(),
                role,
                owner_batch: batch,
            };
            state.entries.insert(
                id,
                ChannelEntry {
                    descriptor: descriptor.clone(),
                    handler: None,
                },
            );
            descriptor
        };

        trace!(channel = %descriptor.id, batch = %batch, "Channel allocated");
        self.publish(ChannelEvent::Allocated {
            channel_id: descriptor.id.clone(),
            role: role.as_str().to_string(),
            batch_id: batch.to_string(),
        });
        Ok(descriptor)
    }

    /// Attaches `handler` to an allocated channel, replacing any previous one.
    pub fn register(
        &self,
        channel_id: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(channel_id)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_id.to_string()))?;
        entry.handler = Some(handler);
        Ok(())
    }

    /// Detaches the handler and retires the identifier.
    ///
    /// Returns `false` if the channel was not active.
    pub fn release(&self, channel_id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.entries.remove(channel_id);
            if removed.is_some() {
                state.stats.released += 1;
            }
            removed
        };

        match removed {
            Some(entry) => {
                // Dropped outside the lock; handlers may own large captures.
                drop(entry);
                trace!(channel = %channel_id, "Channel released");
                self.publish(ChannelEvent::Released {
                    channel_id: channel_id.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Releases every channel owned by `batch`.
    pub fn release_batch(&self, batch: BatchId) -> usize {
        let ids: Vec<String> = {
            let state = self.state.lock();
            state
                .entries
                .values()
                .filter(|entry| entry.descriptor.owner_batch == batch)
                .map(|entry| entry.descriptor.id.clone())
                .collect()
        };
        ids.iter().filter(|id| self.release(id)).count()
    }

    pub fn is_active(&self, channel_id: &str) -> bool {
        self.state.lock().entries.contains_key(channel_id)
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Active channels owned by `batch`.
    pub fn active_for_batch(&self, batch: BatchId) -> Vec<ChannelDescriptor> {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.descriptor.owner_batch == batch)
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn stats(&self) -> ChannelStats {
        self.state.lock().stats
    }

    fn publish(&self, event: ChannelEvent) {
        if let Some(events) = &self.events {
            events.publish(BridgeEvent::Channel(event));
        }
    }
}

#[async_trait]
impl HostCallDispatch for ChannelRegistry {
    async fn invoke_host(
        &self,
        target: &str,
        args: Vec<HostValue>,
    ) -> Result<HostValue, ModuleFault> {
        let handler = {
            let state = self.state.lock();
            match state.entries.get(target) {
                Some(ChannelEntry {
                    handler: Some(handler),
                    ..
                }) => Arc::clone(handler),
                Some(_) => {
                    warn!(channel = %target, "Module invoked an inert channel");
                    return Err(ModuleFault::message(format!(
                        "channel {} has no handler",
                        target
                    )));
                }
                None => {
                    warn!(channel = %target, "Module invoked an unknown channel");
                    return Err(ModuleFault::message(format!(
                        "channel {} not found",
                        target
                    )));
                }
            }
        };

        debug!(channel = %target, args = args.len(), "Dispatching host call");
        handler.handle(args).await
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("prefix", &self.prefix)
            .field("active", &self.active_count())
            .finish()
    }
}

// ============================================================================
// Batch lease
// ============================================================================

/// Channels allocated for one batch, released together.
///
/// Releases on [`ChannelBatch::release_all`] or on drop, so a cancelled batch
/// never leaks channels.
pub struct ChannelBatch {
    registry: Arc<ChannelRegistry>,
    batch: BatchId,
    ids: Vec<String>,
}

impl ChannelBatch {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            batch: BatchId::new(),
            ids: Vec::new(),
        }
    }

    pub fn id(&self) -> BatchId {
        self.batch
    }

    /// Allocates a channel and attaches `handler` to it.
    pub fn open(
        &mut self,
        role: ChannelRole,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<ChannelDescriptor, ChannelError> {
        let descriptor = self.reserve(role)?;
        self.attach(&descriptor, handler)?;
        Ok(descriptor)
    }

    /// Allocates an inert channel owned by this batch.
    ///
    /// Use with [`attach`](Self::attach) when building the handler has side
    /// effects that should only happen once an id is secured.
    pub fn reserve(&mut self, role: ChannelRole) -> Result<ChannelDescriptor, ChannelError> {
        let descriptor = self.registry.allocate(self.batch, role)?;
        self.ids.push(descriptor.id.clone());
        Ok(descriptor)
    }

    /// Attaches `handler` to a channel reserved by this batch.
    pub fn attach(
        &self,
        descriptor: &ChannelDescriptor,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<(), ChannelError> {
        if descriptor.owner_batch != self.batch {
            return Err(ChannelError::UnknownChannel(descriptor.id.clone()));
        }
        self.registry.register(&descriptor.id, handler)
    }

    /// Identifiers allocated so far.
    pub fn channel_ids(&self) -> &[String] {
        &self.ids
    }

    /// Releases every channel in the batch and returns how many were active.
    pub fn release_all(&mut self) -> usize {
        let released = self
            .ids
            .drain(..)
            .filter(|id| self.registry.release(id))
            .count();
        if released > 0 {
            debug!(batch = %self.batch, released, "Batch channels released");
        }
        released
    }
}

impl Drop for ChannelBatch {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ChannelHandler for Echo {
        async fn handle(&self, args: Vec<HostValue>) -> Result<HostValue, ModuleFault> {
            Ok(args.into_iter().next().unwrap_or_default())
        }
    }

    #[test]
    fn test_ids_are_monotonic_and_role_named() {
        let registry = ChannelRegistry::new("__zcn");
        let batch = BatchId::new();

        let a = registry.allocate(batch, ChannelRole::Reader).unwrap();
        let b = registry.allocate(batch, ChannelRole::Progress).unwrap();
        let c = registry.allocate(batch, ChannelRole::Hash).unwrap();

        assert_eq!(a.id, "__zcn_upload_reader_0");
        assert_eq!(b.id, "__zcn_upload_callback_1");
        assert_eq!(c.id, "__zcn_md5_hash_2");
        assert_eq!(registry.active_count(), 3);
    }

    #[test]
    fn test_exhaustion_does_not_wrap() {
        let registry = ChannelRegistry::with_start("__zcn", u64::MAX);
        let err = registry
            .allocate(BatchId::new(), ChannelRole::Reader)
            .unwrap_err();
        assert_eq!(err, ChannelError::Exhausted);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_register_requires_allocation() {
        let registry = ChannelRegistry::new("__zcn");
        let err = registry.register("__zcn_upload_reader_9", Arc::new(Echo));
        assert!(matches!(err, Err(ChannelError::UnknownChannel(_))));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_handler() {
        let registry = ChannelRegistry::new("__zcn");
        let channel = registry
            .allocate(BatchId::new(), ChannelRole::Reader)
            .unwrap();

        let inert = registry.invoke_host(&channel.id, vec![]).await;
        assert!(inert.is_err());

        registry.register(&channel.id, Arc::new(Echo)).unwrap();
        let value = registry
            .invoke_host(&channel.id, vec![HostValue::from(7u64)])
            .await
            .unwrap();
        assert_eq!(value, HostValue::Number(7.0));

        assert!(registry.release(&channel.id));
        assert!(!registry.release(&channel.id));
        assert!(registry.invoke_host(&channel.id, vec![]).await.is_err());
    }

    #[test]
    fn test_batch_lease_releases_on_drop() {
        let registry = Arc::new(ChannelRegistry::new("__zcn"));
        let other = registry
            .allocate(BatchId::new(), ChannelRole::Reader)
            .unwrap();

        {
            let mut batch = ChannelBatch::new(Arc::clone(&registry));
            batch.open(ChannelRole::Reader, Arc::new(Echo)).unwrap();
            batch.open(ChannelRole::Progress, Arc::new(Echo)).unwrap();
            assert_eq!(registry.active_for_batch(batch.id()).len(), 2);
        }

        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_active(&other.id));
        let stats = registry.stats();
        assert_eq!(stats.allocated(), 3);
        assert_eq!(stats.released, 2);
    }

    #[tokio::test]
    async fn test_reserved_channel_is_inert_until_attached() {
        let registry = Arc::new(ChannelRegistry::new("__zcn"));
        let mut batch = ChannelBatch::new(Arc::clone(&registry));
        let mut other = ChannelBatch::new(Arc::clone(&registry));

        let hash = batch.reserve(ChannelRole::Hash).unwrap();
        assert!(registry.invoke_host(&hash.id, vec![]).await.is_err());

        let err = other.attach(&hash, Arc::new(Echo)).unwrap_err();
        assert_eq!(err, ChannelError::UnknownChannel(hash.id.clone()));

        batch.attach(&hash, Arc::new(Echo)).unwrap();
        assert!(registry.invoke_host(&hash.id, vec![]).await.is_ok());

        other.reserve(ChannelRole::Reader).unwrap();
        assert_eq!(batch.release_all(), 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_release_batch() {
        let registry = ChannelRegistry::new("__zcn");
        let batch = BatchId::new();
        registry.allocate(batch, ChannelRole::Reader).unwrap();
        registry.allocate(batch, ChannelRole::Hash).unwrap();
        registry.allocate(BatchId::new(), ChannelRole::Reader).unwrap();

        assert_eq!(registry.release_batch(batch), 2);
        assert_eq!(registry.active_count(), 1);
    }
}
