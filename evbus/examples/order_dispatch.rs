/// 手动装配示例（不使用 EventEngine）
/// 展示 DirectEventBus + DispatchCoordinator + InMemoryExecutor 的组合，
/// 以及按处理器单独指定的固定延迟重试策略
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use evbus::eventing::{
    DirectEventBus, DispatchCoordinator, EventBus, EventHandler, HandlerCatalog, HandlerContext,
    InMemoryExecutor, RetryPolicy, key_of,
};
use evbus_macros::integration_event;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[integration_event(kind = "orders.placed")]
struct OrderPlaced {
    order_id: String,
    amount_cents: u64,
}

// ============================================================================
// 处理器
// ============================================================================

#[derive(Default)]
struct ReserveStock;

#[async_trait]
impl EventHandler<OrderPlaced> for ReserveStock {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderPlaced) -> anyhow::Result<()> {
        println!(
            "[stock] reserve for {} (attempt {})",
            event.order_id,
            ctx.attempt()
        );
        Ok(())
    }
}

static CHARGE_CALLS: AtomicU32 = AtomicU32::new(0);

#[derive(Default)]
struct ChargePayment;

#[async_trait]
impl EventHandler<OrderPlaced> for ChargePayment {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderPlaced) -> anyhow::Result<()> {
        if CHARGE_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("payment gateway timeout");
        }
        println!(
            "[payment] charged {} cents for {} (attempt {})",
            event.amount_cents,
            event.order_id,
            ctx.attempt()
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init();

    let catalog = Arc::new(HandlerCatalog::new());
    catalog.register_default::<OrderPlaced, ReserveStock>()?;
    catalog.register_with_retry::<OrderPlaced, _>(
        ChargePayment::default,
        RetryPolicy::fixed(vec![Duration::from_millis(200), Duration::from_millis(500)]),
    )?;
    println!(
        "handler keys: stock={} payment={}",
        key_of::<ReserveStock>(),
        key_of::<ChargePayment>()
    );

    let token = CancellationToken::new();
    let (executor, worker) = InMemoryExecutor::new(16);
    let coordinator = Arc::new(
        DispatchCoordinator::builder()
            .catalog(catalog)
            .executor(Arc::new(executor))
            .cancellation(token.clone())
            .build(),
    );
    let worker_task = tokio::spawn(worker.run(coordinator.clone(), token.clone()));

    let bus = DirectEventBus::new(coordinator);
    let receipt = bus
        .publish(&OrderPlaced {
            order_id: "o-1001".into(),
            amount_cents: 2599,
        })
        .await?;
    println!("published {} as {}", receipt.kind, receipt.event_id);

    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();
    worker_task.await?;

    println!("payment handler calls: {}", CHARGE_CALLS.load(Ordering::SeqCst));
    Ok(())
}
