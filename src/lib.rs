//! mindmesh-push-agent - 后台通知 Agent
//!
//! 独立于可见应用运行的事件驱动 Agent。
//!
//! # 核心功能
//!
//! - **资源缓存**: 版本化预缓存，activate 时删除过期版本
//! - **Push 订阅**: 权限门控下的订阅 / 取消订阅 / 查询
//! - **通知分发**: 每条 Push 恰好展示一条通知，解码失败退化为纯文本
//! - **点击路由**: 聚焦已有窗口或打开 dashboard
//! - **提醒唤醒**: 按 tag 触发提醒检查
//!
//! # Feature Flags
//!
//! - `agent`: 守护进程模式（Unix Socket + 动作推送）
//!
//! # 架构
//!
//! 宿主把生命周期事件（[`LifecycleEvent`]）逐个交给 [`ServiceAgent`]，
//! 每个事件由一个异步任务处理；所有平台能力通过 [`Host`] / [`PushHost`] 注入。

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod notification;
pub mod protocol;
pub mod reminder;
pub mod router;
pub mod schema;
pub mod subscription;

#[cfg(all(feature = "agent", unix))]
pub mod agent;

// Re-exports
pub use cache::{CacheEntryInfo, CacheStore, PopulateResult};
pub use config::{AgentContext, CacheConfig, ConnectionMode};
pub use dispatch::{dispatch, ServiceAgent};
pub use error::{Error, Result};
pub use host::{
    Capabilities, ClientKind, ClientView, Host, PermissionState, PushHost, PushSubscription,
    SubscribeOptions,
};
pub use notification::{
    build_notification, decode_payload, DecodeOutcome, DisplayedNotification,
    LocalNotificationOptions, NotificationAction, NotificationPayload,
};
pub use protocol::{EventOutcome, LifecycleEvent};
pub use reminder::WakeChannel;
pub use router::{ClickAction, ClickOutcome};
pub use subscription::{url_base64_to_bytes, SubscriptionManager, SubscriptionState};

#[cfg(all(feature = "agent", unix))]
pub use agent::{Agent, AgentConfig, cleanup_stale_agent, is_agent_running};
