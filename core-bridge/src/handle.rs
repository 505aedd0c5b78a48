//! Module lifecycle handle.
//!
//! The module initializes in the background while callers are already issuing
//! calls. [`ModuleHandle`] tracks the lifecycle and resolves every waiter at
//! once when the module becomes ready (or exits), without polling.

use crate::error::{CallError, TransitionError};
use bridge_traits::{HostCallDispatch, ModuleLoader, ModuleSurface};
use core_runtime::events::{BridgeEvent, EventBus, ModuleEvent};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Uninitialized,
    Loading,
    Ready,
    Exited,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninitialized => "uninitialized",
            ModuleState::Loading => "loading",
            ModuleState::Ready => "ready",
            ModuleState::Exited => "exited",
        }
    }

    /// Ready or Exited: waiters can stop waiting.
    pub fn is_settled(&self) -> bool {
        matches!(self, ModuleState::Ready | ModuleState::Exited)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-owned handle to the sandboxed module.
///
/// Reaches `Ready` exactly once and `Exited` at most once; after exit the
/// surface is dropped and every call fails.
pub struct ModuleHandle {
    state: watch::Sender<ModuleState>,
    surface: RwLock<Option<Arc<dyn ModuleSurface>>>,
    events: Option<EventBus>,
}

impl ModuleHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ModuleState::Uninitialized);
        Self {
            state,
            surface: RwLock::new(None),
            events: None,
        }
    }

    /// Creates a handle that reports transitions on `events`.
    pub fn with_events(events: EventBus) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    pub fn state(&self) -> ModuleState {
        *self.state.borrow()
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ModuleState> {
        self.state.subscribe()
    }

    /// The module surface, once ready and until exit.
    pub fn surface(&self) -> Option<Arc<dyn ModuleSurface>> {
        self.surface.read().clone()
    }

    /// `Uninitialized -> Loading`.
    pub fn begin_loading(&self) -> Result<(), TransitionError> {
        self.transition(ModuleState::Loading, |from| {
            from == ModuleState::Uninitialized
        })
    }

    /// `Uninitialized | Loading -> Ready`, publishing the surface.
    pub fn mark_ready(&self, surface: Arc<dyn ModuleSurface>) -> Result<(), TransitionError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if matches!(*state, ModuleState::Uninitialized | ModuleState::Loading) {
                *self.surface.write() = Some(Arc::clone(&surface));
                *state = ModuleState::Ready;
                true
            } else {
                outcome = Err(TransitionError {
                    from: *state,
                    to: ModuleState::Ready,
                });
                false
            }
        });

        if outcome.is_ok() {
            info!("Module ready");
            self.publish(ModuleState::Ready);
        }
        outcome
    }

    /// Moves to `Exited` and drops the surface.
    ///
    /// Returns `false` if the module had already exited.
    pub fn mark_exited(&self) -> bool {
        let exited = self
            .transition(ModuleState::Exited, |from| from != ModuleState::Exited)
            .is_ok();
        if exited {
            self.surface.write().take();
            warn!("Module exited");
        }
        exited
    }

    /// Waits until the module is ready and returns its surface.
    ///
    /// Resolves immediately if the module is already settled. Fails with
    /// [`CallError::ModuleInactive`] if the module exits instead.
    pub async fn ready(&self) -> Result<Arc<dyn ModuleSurface>, CallError> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(ModuleState::is_settled)
            .await
            .map_err(|_| CallError::ModuleInactive)?;

        match state {
            ModuleState::Ready => self.surface().ok_or(CallError::ModuleInactive),
            _ => Err(CallError::ModuleInactive),
        }
    }

    /// Loads the module in the background.
    ///
    /// Transitions to `Loading` immediately, then to `Ready` when the loader
    /// resolves or to `Exited` when it fails.
    pub fn spawn_load(
        self: &Arc<Self>,
        loader: Arc<dyn ModuleLoader>,
        dispatch: Arc<dyn HostCallDispatch>,
    ) -> Result<JoinHandle<()>, TransitionError> {
        self.begin_loading()?;
        let handle = Arc::clone(self);

        Ok(tokio::spawn(async move {
            match loader.load(dispatch).await {
                Ok(surface) => {
                    if let Err(err) = handle.mark_ready(surface) {
                        warn!(error = %err, "Module finished loading after leaving Loading");
                    }
                }
                Err(err) => {
                    error!(error = %err, "Module failed to load");
                    handle.mark_exited();
                }
            }
        }))
    }

    fn transition(
        &self,
        to: ModuleState,
        allowed: impl Fn(ModuleState) -> bool,
    ) -> Result<(), TransitionError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if allowed(*state) {
                *state = to;
                true
            } else {
                outcome = Err(TransitionError { from: *state, to });
                false
            }
        });

        if outcome.is_ok() {
            debug!(state = %to, "Module state changed");
            self.publish(to);
        }
        outcome
    }

    fn publish(&self, state: ModuleState) {
        if let Some(events) = &self.events {
            events.publish(BridgeEvent::Module(ModuleEvent::StateChanged {
                state: state.as_str().to_string(),
            }));
        }
    }
}

impl Default for ModuleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ModuleMember;

    struct EmptySurface;

    impl ModuleSurface for EmptySurface {
        fn member(&self, _name: &str) -> Option<ModuleMember> {
            None
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let handle = ModuleHandle::new();
        assert_eq!(handle.state(), ModuleState::Uninitialized);

        handle.begin_loading().unwrap();
        assert!(handle.begin_loading().is_err());

        handle.mark_ready(Arc::new(EmptySurface)).unwrap();
        assert_eq!(handle.state(), ModuleState::Ready);
        assert!(handle.surface().is_some());

        let err = handle.mark_ready(Arc::new(EmptySurface)).unwrap_err();
        assert_eq!(err.from, ModuleState::Ready);

        assert!(handle.mark_exited());
        assert!(!handle.mark_exited());
        assert!(handle.surface().is_none());
        assert!(handle.mark_ready(Arc::new(EmptySurface)).is_err());
    }

    #[tokio::test]
    async fn test_ready_resolves_all_waiters() {
        let handle = Arc::new(ModuleHandle::new());
        handle.begin_loading().unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.ready().await.is_ok() })
            })
            .collect();

        tokio::task::yield_now().await;
        handle.mark_ready(Arc::new(EmptySurface)).unwrap();

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_exit_rejects_waiters() {
        let handle = Arc::new(ModuleHandle::new());
        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.ready().await })
        };

        tokio::task::yield_now().await;
        handle.mark_exited();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(CallError::ModuleInactive)
        ));
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let handle = ModuleHandle::with_events(bus);

        handle.begin_loading().unwrap();
        handle.mark_ready(Arc::new(EmptySurface)).unwrap();

        let states: Vec<String> = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .into_iter()
            .map(|event| match event {
                BridgeEvent::Module(ModuleEvent::StateChanged { state }) => state,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(states, vec!["loading", "ready"]);
    }
}
