//! Asynchronous call bridge to the module.
//!
//! Every module operation is reached through [`RpcBridge::call`]: the call
//! waits for module readiness, resolves the member by name, invokes it, awaits
//! a deferred result once, and normalizes the module's error convention into
//! [`CallError`].

use crate::error::{CallError, Result};
use crate::handle::{ModuleHandle, ModuleState};
use crate::operation::Operation;
use bridge_traits::{HostValue, Invocation, ModuleMember, ModuleSurface};
use core_runtime::config::BridgeConfig;
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A single call: operation name plus arguments. Not retained after the call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub operation: String,
    pub args: Vec<HostValue>,
}

impl CallRequest {
    pub fn new(operation: impl Into<String>, args: Vec<HostValue>) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }
}

/// Uniform async access to the module's operations.
#[derive(Clone)]
pub struct RpcBridge {
    handle: Arc<ModuleHandle>,
    readiness_timeout: Option<Duration>,
    init_warning_after: Duration,
}

impl RpcBridge {
    pub fn new(handle: Arc<ModuleHandle>, config: &BridgeConfig) -> Self {
        Self {
            handle,
            readiness_timeout: config.readiness_timeout,
            init_warning_after: config.init_warning_after,
        }
    }

    pub fn handle(&self) -> &Arc<ModuleHandle> {
        &self.handle
    }

    /// Calls a member of the module by name.
    pub async fn call(&self, operation: &str, args: Vec<HostValue>) -> Result<HostValue> {
        self.execute(CallRequest::new(operation, args)).await
    }

    /// Calls one of the known operations.
    pub async fn invoke(&self, operation: Operation, args: Vec<HostValue>) -> Result<HostValue> {
        if args.len() != operation.arity() {
            warn!(
                operation = %operation,
                expected = operation.arity(),
                got = args.len(),
                "Argument count differs from the operation's declared arity"
            );
        }
        self.call(operation.as_str(), args).await
    }

    /// Executes a call request.
    ///
    /// - Fails with [`CallError::ModuleInactive`] if the module has exited.
    /// - Waits for readiness, bounded by the configured timeout if any.
    /// - Non-invocable members resolve to their value when called without
    ///   arguments and fail with [`CallError::InvalidUsage`] otherwise.
    /// - A resolved value with a truthy `error` field, a returned fault, or a
    ///   panic inside the module all become [`CallError::ModuleError`].
    #[instrument(skip(self, request), fields(operation = %request.operation, args = request.args.len()))]
    pub async fn execute(&self, request: CallRequest) -> Result<HostValue> {
        if self.handle.state() == ModuleState::Exited {
            return Err(CallError::ModuleInactive);
        }

        let surface = self.await_ready().await?;
        let CallRequest { operation, args } = request;

        let function = match surface
            .member(&operation)
            .unwrap_or(ModuleMember::Value(HostValue::Undefined))
        {
            ModuleMember::Value(value) if args.is_empty() => return Ok(value),
            ModuleMember::Value(_) => {
                return Err(CallError::InvalidUsage {
                    operation,
                    arg_count: args.len(),
                })
            }
            ModuleMember::Function(function) => function,
        };

        let invocation = match panic::catch_unwind(AssertUnwindSafe(|| function.invoke(args))) {
            Ok(Ok(invocation)) => invocation,
            Ok(Err(fault)) => return Err(module_error(operation, fault.into_payload())),
            Err(panic) => return Err(module_error(operation, panic_payload(panic))),
        };

        let value = match invocation {
            Invocation::Ready(value) => value,
            Invocation::Deferred(deferred) => {
                match AssertUnwindSafe(deferred).catch_unwind().await {
                    Ok(Ok(value)) => value,
                    Ok(Err(fault)) => return Err(module_error(operation, fault.into_payload())),
                    Err(panic) => return Err(module_error(operation, panic_payload(panic))),
                }
            }
        };

        if let Some(payload) = value.error_payload() {
            return Err(module_error(operation, payload));
        }

        debug!(kind = value.kind(), "Call resolved");
        Ok(value)
    }

    async fn await_ready(&self) -> Result<Arc<dyn ModuleSurface>> {
        match self.readiness_timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait_with_warning())
                .await
                .map_err(|_| CallError::ReadinessTimeout { waited: limit })?,
            None => self.wait_with_warning().await,
        }
    }

    async fn wait_with_warning(&self) -> Result<Arc<dyn ModuleSurface>> {
        if self.handle.state().is_settled() {
            return self.handle.ready().await;
        }

        let ready = self.handle.ready();
        tokio::pin!(ready);

        tokio::select! {
            result = &mut ready => return result,
            _ = tokio::time::sleep(self.init_warning_after) => {
                warn!(
                    waited = ?self.init_warning_after,
                    "Module still not initialized; call is waiting"
                );
            }
        }

        ready.await
    }
}

fn module_error(operation: String, payload: HostValue) -> CallError {
    debug!(operation = %operation, payload = %payload, "Module call rejected");
    CallError::ModuleError { operation, payload }
}

fn panic_payload(panic: Box<dyn Any + Send>) -> HostValue {
    let message = if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "module panicked".to_string()
    };
    HostValue::String(message)
}
