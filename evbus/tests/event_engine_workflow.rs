use anyhow::Result as AnyResult;
use async_trait::async_trait;
use evbus::config::DispatchConfig;
use evbus::eventing::{
    EventBus, EventEngine, EventHandler, HandlerCatalog, HandlerContext, RetryPolicy,
};
use evbus_macros::integration_event;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[integration_event(kind = "orders.created")]
struct OrderCreated {
    order_id: String,
}

#[integration_event(kind = "orders.updated")]
struct OrderUpdated {
    order_id: String,
}

#[derive(Default)]
struct Journal {
    delivered: Mutex<Vec<(&'static str, String, u32)>>,
    calls: AtomicU32,
    started: AtomicBool,
}

impl Journal {
    fn delivered_by(&self, handler: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _, _)| *h == handler)
            .count()
    }
}

struct SendEmail {
    journal: Arc<Journal>,
}

#[async_trait]
impl EventHandler<OrderCreated> for SendEmail {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderCreated) -> anyhow::Result<()> {
        self.journal.started.store(true, Ordering::SeqCst);
        self.journal.delivered.lock().unwrap().push((
            "email",
            event.order_id.clone(),
            ctx.attempt(),
        ));
        Ok(())
    }
}

/// 前两次调用失败
struct UpdateReadModel {
    journal: Arc<Journal>,
}

#[async_trait]
impl EventHandler<OrderCreated> for UpdateReadModel {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderCreated) -> anyhow::Result<()> {
        let n = self.journal.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= 2 {
            anyhow::bail!("read model store unavailable");
        }
        self.journal.delivered.lock().unwrap().push((
            "read_model",
            event.order_id.clone(),
            ctx.attempt(),
        ));
        Ok(())
    }
}

struct NeverSucceeds {
    journal: Arc<Journal>,
}

#[async_trait]
impl EventHandler<OrderCreated> for NeverSucceeds {
    async fn handle(&self, _ctx: &HandlerContext, _event: &OrderCreated) -> anyhow::Result<()> {
        self.journal.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("permanent failure")
    }
}

fn fast_config(max_retries: u32) -> DispatchConfig {
    DispatchConfig {
        retry: RetryPolicy::exponential(
            max_retries,
            Duration::from_millis(10),
            Duration::from_millis(50),
            0.0,
        ),
        attempt_timeout: Some(Duration::from_secs(1)),
        max_concurrency: 8,
    }
}

async fn wait_until(limit: Duration, cond: impl Fn() -> bool) {
    let _ = tokio::time::timeout(limit, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn event_engine_full_workflow() -> AnyResult<()> {
    init_tracing();
    let journal = Arc::new(Journal::default());
    let catalog = Arc::new(HandlerCatalog::new());
    {
        let j = journal.clone();
        catalog.register::<OrderCreated, _>(move || SendEmail { journal: j.clone() })?;
        let j = journal.clone();
        catalog.register::<OrderCreated, _>(move || UpdateReadModel { journal: j.clone() })?;
    }

    let handle = EventEngine::builder()
        .catalog(catalog)
        .config(fast_config(3))
        .build()
        .start();
    let bus = handle.bus().clone();

    let receipt = bus
        .publish(&OrderCreated {
            order_id: "o-1".into(),
        })
        .await?;
    assert_eq!(receipt.kind, "orders.created");
    // 没有处理器的事件也会被接收
    bus.publish(&OrderUpdated {
        order_id: "o-1".into(),
    })
    .await?;

    // 使用 timeout + 轮询条件，减少固定 sleep 带来的不确定性
    wait_until(Duration::from_secs(3), || {
        journal.delivered_by("email") >= 1 && journal.delivered_by("read_model") >= 1
    })
    .await;
    handle.shutdown();
    handle.join().await;

    let delivered = journal.delivered.lock().unwrap().clone();
    assert_eq!(journal.delivered_by("email"), 1);
    assert_eq!(journal.delivered_by("read_model"), 1);
    assert!(delivered.contains(&("email", "o-1".to_string(), 0)));
    assert!(delivered.contains(&("read_model", "o-1".to_string(), 2)));
    assert_eq!(journal.calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn publish_returns_before_any_handler_runs() -> AnyResult<()> {
    let journal = Arc::new(Journal::default());
    let catalog = Arc::new(HandlerCatalog::new());
    {
        let j = journal.clone();
        catalog.register::<OrderCreated, _>(move || SendEmail { journal: j.clone() })?;
    }

    let handle = EventEngine::builder()
        .catalog(catalog)
        .config(fast_config(0))
        .build()
        .start();

    handle
        .bus()
        .publish(&OrderCreated {
            order_id: "o-2".into(),
        })
        .await?;
    // 单线程运行时下，发布返回前后台任务尚未获得执行机会
    assert!(!journal.started.load(Ordering::SeqCst));

    wait_until(Duration::from_secs(2), || {
        journal.started.load(Ordering::SeqCst)
    })
    .await;
    assert!(journal.started.load(Ordering::SeqCst));

    handle.shutdown();
    handle.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_handler_stops_after_bounded_attempts() -> AnyResult<()> {
    let journal = Arc::new(Journal::default());
    let catalog = Arc::new(HandlerCatalog::new());
    {
        let j = journal.clone();
        catalog.register::<OrderCreated, _>(move || NeverSucceeds { journal: j.clone() })?;
    }

    let handle = EventEngine::builder()
        .catalog(catalog)
        .config(fast_config(2))
        .build()
        .start();

    handle
        .bus()
        .publish(&OrderCreated {
            order_id: "o-3".into(),
        })
        .await?;

    wait_until(Duration::from_secs(2), || {
        journal.calls.load(Ordering::SeqCst) >= 3
    })
    .await;
    // 预算耗尽后不再有后续尝试
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown();
    handle.join().await;

    assert_eq!(journal.calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_attempts_waiting_out_their_backoff() -> AnyResult<()> {
    let journal = Arc::new(Journal::default());
    let catalog = Arc::new(HandlerCatalog::new());
    {
        let j = journal.clone();
        catalog.register::<OrderCreated, _>(move || NeverSucceeds { journal: j.clone() })?;
    }

    let config = DispatchConfig {
        retry: RetryPolicy::exponential(5, Duration::from_secs(10), Duration::from_secs(60), 0.0),
        ..DispatchConfig::default()
    };
    let handle = EventEngine::builder()
        .catalog(catalog)
        .config(config)
        .build()
        .start();

    handle
        .bus()
        .publish(&OrderCreated {
            order_id: "o-4".into(),
        })
        .await?;
    wait_until(Duration::from_secs(2), || {
        journal.calls.load(Ordering::SeqCst) >= 1
    })
    .await;

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle.join()).await?;

    assert_eq!(journal.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn publish_after_shutdown_is_rejected() -> AnyResult<()> {
    let catalog = Arc::new(HandlerCatalog::new());
    let handle = EventEngine::builder().catalog(catalog).build().start();
    let bus = handle.bus().clone();

    handle.shutdown();
    handle.join().await;

    let result = bus
        .publish(&OrderUpdated {
            order_id: "o-5".into(),
        })
        .await;
    assert!(result.is_err());
    Ok(())
}
