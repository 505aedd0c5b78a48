//! Scriptable fake module for tests.
//!
//! Enabled with the `test-support` feature. Downstream crates script the
//! operations they drive and inspect the recorded calls afterwards.

use crate::handle::ModuleHandle;
use async_trait::async_trait;
use bridge_traits::{
    BridgeError, HostCallDispatch, HostValue, Invocation, ModuleFault, ModuleFunction,
    ModuleLoader, ModuleMember, ModuleSurface,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type ScriptFn = dyn Fn(Vec<HostValue>) -> Result<Invocation, ModuleFault> + Send + Sync;

/// A module surface whose members are scripted by the test.
#[derive(Default)]
pub struct ScriptedModule {
    functions: RwLock<HashMap<String, Arc<ScriptFn>>>,
    values: RwLock<HashMap<String, HostValue>>,
    calls: Arc<Mutex<Vec<(String, Vec<HostValue>)>>>,
}

impl ScriptedModule {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts `name` with full control over the invocation outcome.
    pub fn on<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(Vec<HostValue>) -> Result<Invocation, ModuleFault> + Send + Sync + 'static,
    {
        self.functions.write().insert(name.to_string(), Arc::new(f));
        self
    }

    /// Scripts `name` to return synchronously.
    pub fn on_value<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(Vec<HostValue>) -> HostValue + Send + Sync + 'static,
    {
        self.on(name, move |args| Ok(Invocation::Ready(f(args))))
    }

    /// Scripts `name` to return a deferred result.
    pub fn on_async<F, Fut>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HostValue, ModuleFault>> + Send + 'static,
    {
        self.on(name, move |args| Ok(Invocation::deferred(f(args))))
    }

    /// Exposes a non-invocable member.
    pub fn with_value(&self, name: &str, value: impl Into<HostValue>) -> &Self {
        self.values.write().insert(name.to_string(), value.into());
        self
    }

    /// Number of invocations of `name`.
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(op, _)| op == name).count()
    }

    /// Arguments of every invocation of `name`, in order.
    pub fn recorded(&self, name: &str) -> Vec<Vec<HostValue>> {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op == name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Operation names in invocation order.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(op, _)| op.clone()).collect()
    }

    /// A handle that is already `Ready` with this surface.
    pub fn ready_handle(self: &Arc<Self>) -> Arc<ModuleHandle> {
        let handle = Arc::new(ModuleHandle::new());
        let surface: Arc<dyn ModuleSurface> = Arc::clone(self) as Arc<dyn ModuleSurface>;
        // A fresh handle is always Uninitialized.
        let _ = handle.mark_ready(surface);
        handle
    }
}

impl ModuleSurface for ScriptedModule {
    fn member(&self, name: &str) -> Option<ModuleMember> {
        if let Some(script) = self.functions.read().get(name).cloned() {
            let calls = Arc::clone(&self.calls);
            let name = name.to_string();
            let function = move |args: Vec<HostValue>| {
                calls.lock().push((name.clone(), args.clone()));
                script(args)
            };
            return Some(ModuleMember::Function(
                Arc::new(function) as Arc<dyn ModuleFunction>
            ));
        }
        self.values.read().get(name).cloned().map(ModuleMember::Value)
    }
}

/// Loader handing out a [`ScriptedModule`] and keeping the injected dispatch.
pub struct ScriptedLoader {
    module: Arc<ScriptedModule>,
    dispatch: Mutex<Option<Arc<dyn HostCallDispatch>>>,
    fail: bool,
}

impl ScriptedLoader {
    pub fn new(module: Arc<ScriptedModule>) -> Self {
        Self {
            module,
            dispatch: Mutex::new(None),
            fail: false,
        }
    }

    /// A loader whose instantiation fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(ScriptedModule::new())
        }
    }

    /// The host-call dispatch passed to the last load.
    pub fn dispatch(&self) -> Option<Arc<dyn HostCallDispatch>> {
        self.dispatch.lock().clone()
    }
}

#[async_trait]
impl ModuleLoader for ScriptedLoader {
    async fn load(
        &self,
        dispatch: Arc<dyn HostCallDispatch>,
    ) -> bridge_traits::error::Result<Arc<dyn ModuleSurface>> {
        *self.dispatch.lock() = Some(dispatch);
        if self.fail {
            return Err(BridgeError::NotAvailable(
                "module instantiation failed".to_string(),
            ));
        }
        Ok(Arc::clone(&self.module) as Arc<dyn ModuleSurface>)
    }
}
