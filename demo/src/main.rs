//! 订单事件分发演示
//!
//! - `OrderCreated` 有两个处理器：发送邮件（成功）与更新读模型（前两次失败）；
//! - `OrderUpdated` 没有处理器，只产生一条配置告警；
//! - 配置文件路径由 `EVBUS_CONFIG` 指定，日志级别由 `RUST_LOG` 控制，
//!   `EVBUS_LOG_FORMAT=json` 时输出 JSON 日志。
//!
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use evbus::config::DispatchConfig;
use evbus::eventing::{EventBus, EventEngine, EventHandler, HandlerCatalog, HandlerContext};
use evbus_macros::integration_event;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[integration_event]
struct OrderCreated {
    order_id: Uuid,
    customer_email: String,
    total_cents: u64,
}

#[integration_event]
struct OrderUpdated {
    order_id: Uuid,
    status: String,
}

#[derive(Default)]
struct SendConfirmationEmail;

#[async_trait]
impl EventHandler<OrderCreated> for SendConfirmationEmail {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderCreated) -> anyhow::Result<()> {
        info!(
            order_id = %event.order_id,
            to = %event.customer_email,
            attempt = ctx.attempt(),
            "confirmation email sent"
        );
        Ok(())
    }
}

// 演示用的失败开关：处理器实例每次尝试都会重建，计数只能放在进程级
static READ_MODEL_FAILURES: AtomicU32 = AtomicU32::new(2);

#[derive(Default)]
struct UpdateOrderReadModel;

#[async_trait]
impl EventHandler<OrderCreated> for UpdateOrderReadModel {
    async fn handle(&self, ctx: &HandlerContext, event: &OrderCreated) -> anyhow::Result<()> {
        let remaining = READ_MODEL_FAILURES
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            anyhow::bail!("read model store unavailable");
        }
        info!(
            order_id = %event.order_id,
            total_cents = event.total_cents,
            attempt = ctx.attempt(),
            "order read model updated"
        );
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("EVBUS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        builder.json().with_target(false).try_init()
    } else {
        builder.try_init()
    };
}

fn load_config() -> AnyResult<DispatchConfig> {
    match std::env::var_os("EVBUS_CONFIG") {
        Some(path) => DispatchConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {}", path.to_string_lossy())),
        None => Ok(DispatchConfig::default()),
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    init_tracing();
    let config = load_config()?;

    let catalog = Arc::new(HandlerCatalog::new());
    catalog.register_default::<OrderCreated, SendConfirmationEmail>()?;
    catalog.register_default::<OrderCreated, UpdateOrderReadModel>()?;
    info!(kinds = ?catalog.kinds(), "handlers registered");

    let handle = EventEngine::builder()
        .catalog(catalog)
        .config(config.clone())
        .build()
        .start();
    let bus = handle.bus().clone();

    let order_id = Uuid::new_v4();
    bus.publish(&OrderCreated {
        order_id,
        customer_email: "buyer@example.com".into(),
        total_cents: 12_900,
    })
    .await?;
    bus.publish(&OrderUpdated {
        order_id,
        status: "paid".into(),
    })
    .await?;

    // 等待两次退避（约 1s + 2s，外加抖动）后的第三次尝试
    let wait = config.retry.midpoint(0) + config.retry.midpoint(1) + Duration::from_secs(2);
    tokio::time::sleep(wait).await;

    handle.shutdown();
    handle.join().await;
    Ok(())
}
