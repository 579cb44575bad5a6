//! 事件分发
//!
//! 宿主一次投递一个生命周期事件，每个事件由一个异步任务处理。
//! 处理器只读写缓存存储和宿主，不在两个事件之间持有任何锁。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::config::AgentContext;
use crate::error::Result;
use crate::host::Host;
use crate::notification;
use crate::protocol::{EventOutcome, LifecycleEvent};
use crate::reminder::{self, WakeChannel};
use crate::router;

/// 后台通知 Agent
pub struct ServiceAgent {
    ctx: AgentContext,
    cache: Arc<CacheStore>,
    host: Arc<dyn Host>,
    /// 已 spawn 但未结束的事件数
    pending: Arc<AtomicUsize>,
}

/// 事件任务存活期间计数 +1（任务结束或被 abort 时归还）
struct PendingEvent(Arc<AtomicUsize>);

impl PendingEvent {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PendingEvent {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ServiceAgent {
    /// 创建 Agent
    pub fn new(ctx: AgentContext, cache: Arc<CacheStore>, host: Arc<dyn Host>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            cache,
            host,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// 尚未结束的事件数；为 0 时宿主才可以回收 Agent
    pub fn pending_events(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 处理一个事件
    pub async fn handle(&self, event: LifecycleEvent) -> Result<EventOutcome> {
        let name = event.name();
        tracing::debug!("📥 事件: {}", name);

        let result = dispatch(&self.ctx, &self.cache, self.host.as_ref(), event).await;
        if let Err(ref e) = result {
            tracing::error!("❌ 事件处理失败: {}: {}", name, e);
        }
        result
    }

    /// 在独立任务中处理事件
    ///
    /// 返回的句柄就是该事件的"未完成工作"，宿主在它结束前不得回收 Agent。
    pub fn spawn(self: &Arc<Self>, event: LifecycleEvent) -> JoinHandle<Result<EventOutcome>> {
        let agent = self.clone();
        let pending = PendingEvent::enter(&self.pending);
        tokio::spawn(async move {
            let _pending = pending;
            agent.handle(event).await
        })
    }
}

/// 按事件类型分发
pub async fn dispatch(
    ctx: &AgentContext,
    cache: &CacheStore,
    host: &dyn Host,
    event: LifecycleEvent,
) -> Result<EventOutcome> {
    match event {
        LifecycleEvent::Install => {
            let result = cache.populate(&ctx.cache_version, &ctx.manifest, host).await?;
            // 只有预缓存完整成功才进入就绪
            host.skip_waiting().await?;
            tracing::info!("🚀 Agent installed: version={}", result.version);
            Ok(EventOutcome::Installed {
                version: result.version,
                entries: result.entries,
            })
        }

        LifecycleEvent::Activate => {
            let pruned = cache.prune_except(&ctx.cache_version)?;
            host.claim_clients().await?;
            tracing::info!("✅ Agent activated: version={}", ctx.cache_version);
            Ok(EventOutcome::Activated { pruned })
        }

        LifecycleEvent::Push { payload } => {
            let notification = notification::dispatch_push(ctx, host, payload.as_deref()).await?;
            Ok(EventOutcome::NotificationShown { notification })
        }

        LifecycleEvent::NotificationClick {
            notification_id,
            action,
        } => {
            let outcome =
                router::route_click(ctx, host, &notification_id, action.as_deref()).await?;
            Ok(EventOutcome::Clicked { outcome })
        }

        LifecycleEvent::Sync { tag } => {
            let checked = reminder::handle_wake(host, WakeChannel::OneOff, &tag).await?;
            Ok(EventOutcome::Woke { tag, checked })
        }

        LifecycleEvent::PeriodicSync { tag } => {
            let checked = reminder::handle_wake(host, WakeChannel::Periodic, &tag).await?;
            Ok(EventOutcome::Woke { tag, checked })
        }
    }
}
