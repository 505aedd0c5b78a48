//! Seams between the host and the sandboxed SDK module.
//!
//! The module exposes a surface of named members, some callable and some plain
//! values. It reaches back into the host only through [`HostCallDispatch`],
//! addressing callbacks by opaque identifier because it cannot hold closures.

use crate::error::Result;
use crate::value::HostValue;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Failure raised by the module (or by a host callback the module invoked).
///
/// Carries the structured payload that crossed the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleFault {
    payload: HostValue,
}

impl ModuleFault {
    pub fn new(payload: impl Into<HostValue>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Fault carrying a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(HostValue::String(message.into()))
    }

    pub fn payload(&self) -> &HostValue {
        &self.payload
    }

    pub fn into_payload(self) -> HostValue {
        self.payload
    }
}

impl fmt::Display for ModuleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.payload)
    }
}

impl std::error::Error for ModuleFault {}

/// A deferred module result, awaited exactly once.
pub type DeferredValue = BoxFuture<'static, std::result::Result<HostValue, ModuleFault>>;

/// Immediate outcome of invoking a module function.
pub enum Invocation {
    /// The function returned synchronously.
    Ready(HostValue),
    /// The function returned an awaitable.
    Deferred(DeferredValue),
}

impl Invocation {
    pub fn deferred<F>(future: F) -> Self
    where
        F: std::future::Future<Output = std::result::Result<HostValue, ModuleFault>>
            + Send
            + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A callable member of the module surface.
pub trait ModuleFunction: Send + Sync {
    fn invoke(&self, args: Vec<HostValue>) -> std::result::Result<Invocation, ModuleFault>;
}

impl<F> ModuleFunction for F
where
    F: Fn(Vec<HostValue>) -> std::result::Result<Invocation, ModuleFault> + Send + Sync,
{
    fn invoke(&self, args: Vec<HostValue>) -> std::result::Result<Invocation, ModuleFault> {
        self(args)
    }
}

/// A resolved member of the module surface.
#[derive(Clone)]
pub enum ModuleMember {
    /// Non-invocable property.
    Value(HostValue),
    /// Invocable function.
    Function(Arc<dyn ModuleFunction>),
}

impl fmt::Debug for ModuleMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// The module's exposed operation surface.
///
/// Membership is not known ahead of time; lookups happen per call.
pub trait ModuleSurface: Send + Sync {
    fn member(&self, name: &str) -> Option<ModuleMember>;
}

/// Entry point the module uses to call back into the host.
///
/// The host injects an implementation at load time; the module addresses
/// callbacks by identifier only.
#[async_trait]
pub trait HostCallDispatch: Send + Sync {
    async fn invoke_host(
        &self,
        target: &str,
        args: Vec<HostValue>,
    ) -> std::result::Result<HostValue, ModuleFault>;
}

/// Loads and instantiates the module.
///
/// Resolves once the module has finished initializing and its surface can
/// serve calls.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, dispatch: Arc<dyn HostCallDispatch>) -> Result<Arc<dyn ModuleSurface>>;
}
