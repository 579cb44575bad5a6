//! 宿主接口
//!
//! Agent 不直接接触任何平台 API：资源拉取、通知展示、窗口枚举、Push 订阅
//! 全部通过这里的 trait 交给宿主实现。测试使用内存实现，守护进程使用
//! Unix Socket 实现（见 `agent::host`）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::notification::{DisplayedNotification, LocalNotificationOptions};

/// 通知权限状态（由宿主持有，Agent 只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 宿主能力探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// 后台 Agent 注册
    pub background_agent: bool,
    /// Push 消息
    pub push_messaging: bool,
    /// 通知展示
    pub notifications: bool,
}

impl Capabilities {
    /// 三项能力齐全
    pub fn all() -> Self {
        Self {
            background_agent: true,
            push_messaging: true,
            notifications: true,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.background_agent && self.push_messaging && self.notifications
    }
}

/// Push 订阅句柄（由宿主 Push 服务签发，Agent 从不本地构造）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// 推送端点
    pub endpoint: String,
    /// 激活时间
    pub activated_at: DateTime<Utc>,
    /// 宿主返回的密钥材料（p256dh / auth 等），透传不解析
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<serde_json::Value>,
}

/// 订阅参数
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// 每条 Push 都必须展示可见通知
    pub user_visible_only: bool,
    /// VAPID 公钥（已解码）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_server_key: Option<Vec<u8>>,
}

/// Client 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Window,
    Worker,
}

/// 宿主中已打开的 Client 视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientView {
    pub id: String,
    /// 完整 URL 或路径
    pub url: String,
    #[serde(default)]
    pub kind: ClientKind,
    /// 是否支持 focus
    #[serde(default = "default_true")]
    pub focusable: bool,
}

fn default_true() -> bool {
    true
}

/// Agent 侧宿主接口（事件处理器使用）
#[async_trait]
pub trait Host: Send + Sync {
    /// 拉取资源（install 预缓存）
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// 跳过等待，不等旧 Agent 退出即可激活
    async fn skip_waiting(&self) -> Result<()>;

    /// 接管已存在的 Client 视图
    async fn claim_clients(&self) -> Result<()>;

    /// 展示通知
    async fn show_notification(&self, notification: &DisplayedNotification) -> Result<()>;

    /// 关闭通知
    async fn close_notification(&self, notification_id: &str) -> Result<()>;

    /// 按枚举顺序返回已打开的 Client
    async fn match_all(&self, kind: ClientKind) -> Result<Vec<ClientView>>;

    /// 聚焦 Client
    async fn focus(&self, client_id: &str) -> Result<()>;

    /// 打开新窗口；宿主不支持时返回 None
    async fn open_window(&self, url: &str) -> Result<Option<ClientView>>;

    /// 提醒检查回调（外部协作者，必须可并发、幂等）
    async fn check_reminders(&self, tag: &str) -> Result<()>;
}

/// 交互侧宿主接口（订阅管理器使用）
#[async_trait]
pub trait PushHost: Send + Sync {
    /// 能力探测
    fn capabilities(&self) -> Capabilities;

    /// 注册后台 Agent（幂等）
    async fn register_agent(&self, script_location: &str) -> Result<()>;

    /// 当前权限
    fn permission(&self) -> PermissionState;

    /// 请求权限，挂起直到用户响应（无超时）
    async fn request_permission(&self) -> PermissionState;

    /// 等待 Agent 就绪
    async fn ready(&self) -> Result<()>;

    /// 创建 Push 订阅
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PushSubscription>;

    /// 查询当前订阅
    async fn get_subscription(&self) -> Result<Option<PushSubscription>>;

    /// 撤销订阅
    async fn revoke(&self, subscription: &PushSubscription) -> Result<bool>;

    /// 直接展示本地通知（不经过 Push）
    async fn show_local_notification(&self, title: &str, options: &LocalNotificationOptions) -> Result<()>;
}
