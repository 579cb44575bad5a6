//! 动作广播
//!
//! 每个连接一个 [`Subscriber`]：写通道 + 订阅的动作类别。
//! 宿主动作（展示通知、聚焦窗口……）按类别投递，写满或已断开的连接直接跳过。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::{EventType, Push, Response};

/// 连接 ID
pub type ConnId = u64;

/// 单个连接的写通道（已编码的 JSONL 行）
pub type LineSender = mpsc::Sender<String>;

struct Subscriber {
    lines: LineSender,
    events: HashSet<EventType>,
}

/// 动作广播器
pub struct Broadcaster {
    subscribers: RwLock<HashMap<ConnId, Subscriber>>,
    next_conn_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// 登记连接（初始不订阅任何类别）
    pub fn register(&self, lines: LineSender) -> ConnId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(
            conn_id,
            Subscriber {
                lines,
                events: HashSet::new(),
            },
        );
        conn_id
    }

    pub fn unregister(&self, conn_id: ConnId) {
        self.subscribers.write().remove(&conn_id);
    }

    /// 调整订阅类别
    pub fn set_interest(&self, conn_id: ConnId, events: &[EventType], interested: bool) {
        let mut subscribers = self.subscribers.write();
        let Some(subscriber) = subscribers.get_mut(&conn_id) else {
            return;
        };
        for event in events {
            if interested {
                subscriber.events.insert(*event);
            } else {
                subscriber.events.remove(event);
            }
        }
        tracing::debug!(
            "📡 conn_id={} 订阅类别: {:?}",
            conn_id,
            subscriber.events
        );
    }

    /// 把动作投递给订阅了该类别的连接，返回投递成功的连接数
    pub fn broadcast(&self, push: Push) -> usize {
        let event_type = push.event_type();
        let line = match encode_line(&push) {
            Some(line) => line,
            None => return 0,
        };

        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for (conn_id, subscriber) in subscribers.iter() {
            if !subscriber.events.contains(&event_type) {
                continue;
            }
            match subscriber.lines.try_send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("📡 写通道已满，丢弃 {:?}: conn_id={}", event_type, conn_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        tracing::debug!("📡 {:?} → {} 个连接", event_type, delivered);
        delivered
    }

    /// 给指定连接写响应（等待写通道有空位）
    pub async fn reply(&self, conn_id: ConnId, response: &Response) -> bool {
        let Some(line) = encode_line(response) else {
            return false;
        };
        let lines = self
            .subscribers
            .read()
            .get(&conn_id)
            .map(|s| s.lines.clone());

        match lines {
            Some(lines) => lines.send(line).await.is_ok(),
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

fn encode_line<T: serde::Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(format!("{}\n", json)),
        Err(e) => {
            tracing::error!("编码消息失败: {}", e);
            None
        }
    }
}
