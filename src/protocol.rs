//! 事件与 IPC 协议定义
//!
//! - [`LifecycleEvent`]: 宿主投递给 Agent 的生命周期事件
//! - [`Request`] / [`Response`] / [`Push`]: 守护进程的 Unix Socket + JSONL 协议
//!   （每条消息一行 JSON + '\n'）

use serde::{Deserialize, Serialize};

use crate::host::ClientView;
use crate::notification::DisplayedNotification;
use crate::router::ClickOutcome;

/// 生命周期事件（宿主 → Agent）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// 新版本 Agent 首次注册
    Install,

    /// Agent 接管已有视图
    Activate,

    /// 收到 Push 消息
    Push {
        /// 原始负载字节（线上为 base64）；不带负载的 Push 为 None
        #[serde(default, with = "base64_payload", skip_serializing_if = "Option::is_none")]
        payload: Option<Vec<u8>>,
    },

    /// 用户点击 / 关闭了通知
    NotificationClick {
        notification_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },

    /// 一次性后台唤醒
    Sync { tag: String },

    /// 周期后台唤醒
    PeriodicSync { tag: String },
}

impl LifecycleEvent {
    /// 事件名（日志用）
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Push { .. } => "push",
            LifecycleEvent::NotificationClick { .. } => "notificationclick",
            LifecycleEvent::Sync { .. } => "sync",
            LifecycleEvent::PeriodicSync { .. } => "periodicsync",
        }
    }

    /// 带负载的 Push
    pub fn push(payload: impl Into<Vec<u8>>) -> Self {
        LifecycleEvent::Push {
            payload: Some(payload.into()),
        }
    }
}

/// Push 负载的 base64 编解码（JSONL 里不能直接放任意字节）
mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(payload: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match payload {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// 事件处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOutcome {
    /// 预缓存完成，已发出 skip_waiting
    Installed { version: String, entries: usize },
    /// 过期版本已清理，已接管视图
    Activated { pruned: Vec<String> },
    /// 展示了一条通知
    NotificationShown { notification: DisplayedNotification },
    /// 点击已路由
    Clicked { outcome: ClickOutcome },
    /// 唤醒已处理
    Woke { tag: String, checked: bool },
}

/// 请求类型（宿主连接 → Agent）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// 握手
    Handshake {
        /// 组件名称
        component: String,
        /// 组件版本（用于日志和诊断）
        version: String,
    },

    /// 订阅推送
    Subscribe { events: Vec<EventType> },

    /// 取消订阅推送
    Unsubscribe { events: Vec<EventType> },

    /// 投递生命周期事件，处理完成后才返回响应
    Dispatch { event: LifecycleEvent },

    /// 宿主上报当前打开的 Client（按枚举顺序）
    UpdateClients { clients: Vec<ClientView> },

    /// 心跳（保持连接）
    Heartbeat,

    /// 查询
    Query { query_type: QueryType },
}

/// 响应类型（Agent → 宿主连接）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// 成功
    Ok,

    /// 错误
    Error { code: i32, message: String },

    /// 握手成功
    HandshakeOk { agent_version: String },

    /// 事件已处理
    Dispatched { outcome: EventOutcome },

    /// 查询结果
    QueryResult { data: serde_json::Value },
}

/// 推送消息（Agent → 订阅者），即需要宿主执行的动作
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Push {
    /// 展示通知
    ShowNotification { notification: DisplayedNotification },

    /// 关闭通知
    CloseNotification { notification_id: String },

    /// 聚焦窗口
    FocusClient { client_id: String },

    /// 打开窗口
    OpenWindow { client_id: String, url: String },

    /// 提醒检查
    ReminderCheck { tag: String },

    /// 预缓存完成，可以激活
    Ready { version: String },

    /// 已接管视图
    Claimed,
}

/// 推送类型（用于订阅）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 通知展示 / 关闭
    Notification,
    /// 窗口聚焦 / 打开
    Window,
    /// 提醒检查
    Reminder,
    /// Agent 生命周期（Ready / Claimed）
    Lifecycle,
}

impl Push {
    /// 推送类型
    pub fn event_type(&self) -> EventType {
        match self {
            Push::ShowNotification { .. } | Push::CloseNotification { .. } => {
                EventType::Notification
            }
            Push::FocusClient { .. } | Push::OpenWindow { .. } => EventType::Window,
            Push::ReminderCheck { .. } => EventType::Reminder,
            Push::Ready { .. } | Push::Claimed => EventType::Lifecycle,
        }
    }
}

/// 查询类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "query")]
pub enum QueryType {
    /// 获取 Agent 状态
    Status,
    /// 获取连接数
    ConnectionCount,
    /// 列出缓存版本
    CacheVersions,
}
