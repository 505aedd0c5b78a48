use async_trait::async_trait;
use bridge_traits::{
    BridgeError, HostCallDispatch, HostValue, Invocation, ModuleFault, ModuleFunction,
    ModuleLoader, ModuleMember, ModuleSurface,
};
use core_bridge::{
    BatchId, CallError, ChannelBatch, ChannelHandler, ChannelRegistry, ChannelRole, ModuleHandle,
    ModuleState, Operation, RpcBridge, SdkClient,
};
use core_runtime::BridgeConfig;
use mockall::mock;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeModule {
    members: HashMap<String, ModuleMember>,
}

impl FakeModule {
    fn function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<Invocation, ModuleFault> + Send + Sync + 'static,
    {
        self.members.insert(
            name.to_string(),
            ModuleMember::Function(Arc::new(f) as Arc<dyn ModuleFunction>),
        );
        self
    }

    fn value(mut self, name: &str, value: HostValue) -> Self {
        self.members
            .insert(name.to_string(), ModuleMember::Value(value));
        self
    }
}

impl ModuleSurface for FakeModule {
    fn member(&self, name: &str) -> Option<ModuleMember> {
        self.members.get(name).cloned()
    }
}

struct FakeLoader {
    surface: Option<Arc<FakeModule>>,
}

#[async_trait]
impl ModuleLoader for FakeLoader {
    async fn load(
        &self,
        _dispatch: Arc<dyn HostCallDispatch>,
    ) -> bridge_traits::error::Result<Arc<dyn ModuleSurface>> {
        match &self.surface {
            Some(surface) => Ok(Arc::clone(surface) as Arc<dyn ModuleSurface>),
            None => Err(BridgeError::NotAvailable("no module".to_string())),
        }
    }
}

mock! {
    Handler {}

    #[async_trait]
    impl ChannelHandler for Handler {
        async fn handle(&self, args: Vec<HostValue>) -> Result<HostValue, ModuleFault>;
    }
}

fn ready_bridge(module: FakeModule) -> RpcBridge {
    let handle = Arc::new(ModuleHandle::new());
    handle.mark_ready(Arc::new(module)).unwrap();
    RpcBridge::new(handle, &BridgeConfig::default())
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test]
async fn test_call_waits_for_ready() {
    let handle = Arc::new(ModuleHandle::new());
    handle.begin_loading().unwrap();
    let bridge = RpcBridge::new(Arc::clone(&handle), &BridgeConfig::default());

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.call("version", vec![]).await }
    });

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!call.is_finished());

    let module = FakeModule::default().value("version", HostValue::from("1.2.0"));
    handle.mark_ready(Arc::new(module)).unwrap();

    assert_eq!(call.await.unwrap().unwrap(), HostValue::from("1.2.0"));
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout() {
    let handle = Arc::new(ModuleHandle::new());
    handle.begin_loading().unwrap();
    let config = BridgeConfig::builder()
        .readiness_timeout(Duration::from_secs(3))
        .build()
        .unwrap();
    let bridge = RpcBridge::new(handle, &config);

    let err = bridge.call("play", vec![]).await.unwrap_err();
    assert_eq!(
        err,
        CallError::ReadinessTimeout {
            waited: Duration::from_secs(3)
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_exit_rejects_pending_and_later_calls() {
    let handle = Arc::new(ModuleHandle::new());
    let bridge = RpcBridge::new(Arc::clone(&handle), &BridgeConfig::default());

    let pending = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.call("stop", vec![]).await }
    });
    tokio::task::yield_now().await;

    assert!(handle.mark_exited());
    assert_eq!(pending.await.unwrap(), Err(CallError::ModuleInactive));
    assert_eq!(
        bridge.call("stop", vec![]).await,
        Err(CallError::ModuleInactive)
    );
}

#[tokio::test]
async fn test_spawn_load_success_and_failure() {
    let registry: Arc<dyn HostCallDispatch> = Arc::new(ChannelRegistry::new("__zcn"));

    let handle = Arc::new(ModuleHandle::new());
    let loader = Arc::new(FakeLoader {
        surface: Some(Arc::new(FakeModule::default())),
    });
    handle
        .spawn_load(loader, Arc::clone(&registry))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(handle.state(), ModuleState::Ready);

    let failing = Arc::new(ModuleHandle::new());
    failing
        .spawn_load(Arc::new(FakeLoader { surface: None }), registry)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(failing.state(), ModuleState::Exited);
}

// ============================================================================
// Member resolution and error normalization
// ============================================================================

#[tokio::test]
async fn test_non_invocable_members() {
    let bridge = ready_bridge(FakeModule::default().value("ready", HostValue::Bool(true)));

    assert_eq!(bridge.call("ready", vec![]).await, Ok(HostValue::Bool(true)));
    assert_eq!(
        bridge.call("ready", vec![HostValue::from(1u64)]).await,
        Err(CallError::InvalidUsage {
            operation: "ready".to_string(),
            arg_count: 1
        })
    );

    assert_eq!(bridge.call("missing", vec![]).await, Ok(HostValue::Undefined));
    assert!(matches!(
        bridge.call("missing", vec![HostValue::Null]).await,
        Err(CallError::InvalidUsage { .. })
    ));
}

#[tokio::test]
async fn test_module_error_sources() {
    let module = FakeModule::default()
        .function("download", |_| {
            Ok(Invocation::Ready(HostValue::Json(
                json!({"error": "not found", "url": ""}),
            )))
        })
        .function("fault", |_| Err(ModuleFault::message("bad input")))
        .function("panics", |_| panic!("module crashed"))
        .function("deferred_fault", |_| {
            Ok(Invocation::deferred(async {
                Err(ModuleFault::message("late failure"))
            }))
        });
    let bridge = ready_bridge(module);

    let err = bridge.call("download", vec![]).await.unwrap_err();
    assert_eq!(err.module_message().as_deref(), Some("not found"));

    let err = bridge.call("fault", vec![]).await.unwrap_err();
    assert_eq!(err.payload(), Some(&HostValue::from("bad input")));

    let err = bridge.call("panics", vec![]).await.unwrap_err();
    assert_eq!(err.payload(), Some(&HostValue::from("module crashed")));

    let err = bridge.call("deferred_fault", vec![]).await.unwrap_err();
    assert_eq!(err.module_message().as_deref(), Some("late failure"));
}

#[tokio::test]
async fn test_deferred_result_awaited_once() {
    let polls = Arc::new(AtomicUsize::new(0));
    let module = FakeModule::default().function("getNextSegment", {
        let polls = Arc::clone(&polls);
        move |_| {
            let polls = Arc::clone(&polls);
            Ok(Invocation::deferred(async move {
                polls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(HostValue::from(vec![1u8, 2, 3]))
            }))
        }
    });
    let client = SdkClient::new(ready_bridge(module));

    let segment = client.get_next_segment().await.unwrap();
    assert_eq!(segment.as_deref(), Some(&[1u8, 2, 3][..]));
    assert_eq!(polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_typed_client_results() {
    let module = FakeModule::default()
        .function("getNextSegment", |_| Ok(Invocation::Ready(HostValue::from(Vec::<u8>::new()))))
        .function("download", |args| {
            assert_eq!(args.len(), Operation::Download.arity());
            Ok(Invocation::Ready(HostValue::Json(json!({"url": "blob:abc"}))))
        })
        .function("multiUpload", |_| {
            Ok(Invocation::Ready(HostValue::Json(
                json!({"success": false, "error": ""}),
            )))
        });
    let client = SdkClient::new(ready_bridge(module));

    assert_eq!(client.get_next_segment().await.unwrap(), None);

    let play = core_bridge::PlayRequest::new("alloc", "/a.mp4");
    let response = client
        .download(&core_bridge::DownloadRequest::for_playback(&play, 10))
        .await
        .unwrap();
    assert_eq!(response.url, "blob:abc");

    let result = client.multi_upload("[]".to_string()).await.unwrap();
    assert!(!result.success);
}

// ============================================================================
// Channels
// ============================================================================

#[tokio::test]
async fn test_concurrent_batches_never_collide() {
    let registry = Arc::new(ChannelRegistry::new("__zcn"));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let batch = BatchId::new();
                let mut ids = Vec::new();
                for _ in 0..16 {
                    ids.push(registry.allocate(batch, ChannelRole::Reader).unwrap().id);
                    tokio::task::yield_now().await;
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "duplicate channel id");
        }
    }
    assert_eq!(seen.len(), 128);
    assert_eq!(registry.active_count(), 128);
}

#[tokio::test]
async fn test_module_invokes_registered_handler() {
    let registry = Arc::new(ChannelRegistry::new("__zcn"));

    let mut handler = MockHandler::new();
    handler
        .expect_handle()
        .times(1)
        .returning(|args| Ok(HostValue::from(args.len() as u64)));

    let mut batch = ChannelBatch::new(Arc::clone(&registry));
    let channel = batch.open(ChannelRole::Hash, Arc::new(handler)).unwrap();
    assert_eq!(channel.owner_batch, batch.id());

    let dispatch: Arc<dyn HostCallDispatch> = registry.clone();
    let value = dispatch
        .invoke_host(&channel.id, vec![HostValue::Null, HostValue::Null])
        .await
        .unwrap();
    assert_eq!(value, HostValue::Number(2.0));

    drop(batch);
    assert_eq!(registry.active_count(), 0);
    assert!(dispatch.invoke_host(&channel.id, vec![]).await.is_err());
}
