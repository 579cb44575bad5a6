//! 通知分发
//!
//! 把一次 Push 事件变成恰好一条可展示的通知：
//! 1. 从默认模板开始
//! 2. 负载能按 `{title, body, data, actions}` 解码时覆盖模板
//! 3. 解码失败时原始文本直接作为 body（绝不向上抛出）
//! 4. 交给宿主展示

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AgentContext;
use crate::error::Result;
use crate::host::Host;

/// 主操作：打开应用
pub const ACTION_EXPLORE: &str = "explore";

/// 次操作：关闭
pub const ACTION_CLOSE: &str = "close";

/// 通知上的操作按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// 操作 ID
    pub action: String,
    /// 按钮文字
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }
}

/// Push 负载（线上格式，所有字段可选）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<NotificationAction>>,
}

impl NotificationPayload {
    /// 从 JSON 对象逐字段提取
    ///
    /// 类型不符的字段按缺省处理，不影响其他字段。
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let text = |field: &str| object.get(field).and_then(Value::as_str).map(str::to_owned);

        let actions = object.get("actions").and_then(|raw| {
            match serde_json::from_value::<Vec<NotificationAction>>(raw.clone()) {
                Ok(actions) => Some(actions),
                Err(e) => {
                    tracing::debug!("忽略无法解析的 actions: {}", e);
                    None
                }
            }
        });

        Self {
            title: text("title"),
            body: text("body"),
            data: object.get("data").and_then(Value::as_object).cloned(),
            actions,
        }
    }
}

/// 待展示的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayedNotification {
    /// 宿主关闭通知时使用
    pub id: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: Map<String, Value>,
    pub actions: Vec<NotificationAction>,
}

impl DisplayedNotification {
    /// 默认模板
    pub fn template(ctx: &AgentContext, arrival: DateTime<Utc>) -> Self {
        let mut data = Map::new();
        data.insert("dateOfArrival".to_string(), Value::from(arrival.timestamp_millis()));
        data.insert("primaryKey".to_string(), Value::from(1));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: ctx.app_name.clone(),
            body: ctx.default_body.clone(),
            icon: ctx.icon.clone(),
            badge: ctx.badge.clone(),
            vibrate: ctx.vibrate.clone(),
            data,
            actions: vec![
                NotificationAction::new(ACTION_EXPLORE, "Open App"),
                NotificationAction::new(ACTION_CLOSE, "Dismiss"),
            ],
        }
    }
}

/// 负载解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// 事件不带负载
    Empty,
    /// 结构化负载
    Structured(NotificationPayload),
    /// 解码失败，退化为纯文本
    Fallback(String),
}

/// 解码 Push 负载
///
/// 空字节串也算"带负载"：按纯文本退化，body 为空串。
pub fn decode_payload(payload: Option<&[u8]>) -> DecodeOutcome {
    let Some(bytes) = payload else {
        return DecodeOutcome::Empty;
    };

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => {
            DecodeOutcome::Structured(NotificationPayload::from_object(&object))
        }
        Ok(other) => {
            tracing::warn!("⚠️ Push 负载不是 JSON 对象 ({}), 按纯文本展示", json_kind(&other));
            DecodeOutcome::Fallback(String::from_utf8_lossy(bytes).into_owned())
        }
        Err(e) => {
            tracing::warn!("⚠️ Push 负载解码失败，按纯文本展示: {}", e);
            DecodeOutcome::Fallback(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 构造通知（到达时间取当前时间）
pub fn build_notification(ctx: &AgentContext, payload: Option<&[u8]>) -> DisplayedNotification {
    build_notification_at(ctx, payload, Utc::now())
}

/// 构造通知
pub fn build_notification_at(
    ctx: &AgentContext,
    payload: Option<&[u8]>,
    arrival: DateTime<Utc>,
) -> DisplayedNotification {
    let mut notification = DisplayedNotification::template(ctx, arrival);

    match decode_payload(payload) {
        DecodeOutcome::Empty => {}
        DecodeOutcome::Structured(decoded) => {
            // 空字符串视为缺省
            if let Some(body) = decoded.body.filter(|b| !b.is_empty()) {
                notification.body = body;
            }
            notification.title = decoded
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| ctx.app_name.clone());
            if let Some(data) = decoded.data {
                for (key, value) in data {
                    notification.data.insert(key, value);
                }
            }
            if let Some(actions) = decoded.actions.filter(|a| !a.is_empty()) {
                notification.actions = actions;
            }
        }
        DecodeOutcome::Fallback(text) => {
            notification.body = text;
        }
    }

    notification
}

/// 处理一次 Push：构造并展示恰好一条通知
pub async fn dispatch_push(
    ctx: &AgentContext,
    host: &dyn Host,
    payload: Option<&[u8]>,
) -> Result<DisplayedNotification> {
    let notification = build_notification(ctx, payload);

    tracing::debug!(
        "🔔 展示通知: id={}, title={}, body_len={}",
        notification.id,
        notification.title,
        notification.body.len()
    );

    host.show_notification(&notification).await?;
    Ok(notification)
}

/// 本地通知参数（不经过 Push，直接由交互侧展示）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalNotificationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LocalNotificationOptions {
    /// 补全默认图标（调用方显式给出的值优先）
    pub fn with_defaults(mut self, ctx: &AgentContext) -> Self {
        if self.icon.is_none() {
            self.icon = Some(ctx.icon.clone());
        }
        if self.badge.is_none() {
            self.badge = Some(ctx.badge.clone());
        }
        self
    }
}
