//! Push 订阅管理
//!
//! 状态机：
//!
//! ```text
//! Unsupported                      (能力缺失，所有操作直接失败)
//! Unregistered ──register──▶ Unsubscribed ◀──────────────┐
//!                                 │ subscribe            │ unsubscribe
//!                                 ▼                      │
//!                            Subscribing ──▶ Subscribed ─┴▶ Unsubscribing
//! ```
//!
//! 订阅句柄从不在本地持久化，`is_subscribed` 每次都向宿主重新查询。

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::AgentContext;
use crate::error::{Error, Result};
use crate::host::{PermissionState, PushHost, PushSubscription, SubscribeOptions};
use crate::notification::LocalNotificationOptions;

/// 订阅状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Unsupported,
    Unregistered,
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

impl SubscriptionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionState::Unsupported => "unsupported",
            SubscriptionState::Unregistered => "unregistered",
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Subscribed => "subscribed",
            SubscriptionState::Unsubscribing => "unsubscribing",
        }
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 过渡状态守卫：未提交就被丢弃（出错或 future 被取消）时回到 fallback
struct Transition<'a> {
    state: &'a Mutex<SubscriptionState>,
    fallback: SubscriptionState,
    committed: bool,
}

impl<'a> Transition<'a> {
    /// 当前状态属于 `from` 时原子地切到 `through`，否则返回当前状态
    fn begin(
        state: &'a Mutex<SubscriptionState>,
        from: &[SubscriptionState],
        through: SubscriptionState,
    ) -> std::result::Result<Self, SubscriptionState> {
        let mut current = state.lock();
        if !from.contains(&*current) {
            return Err(*current);
        }
        let fallback = std::mem::replace(&mut *current, through);
        Ok(Self {
            state,
            fallback,
            committed: false,
        })
    }

    fn commit(mut self, next: SubscriptionState) {
        *self.state.lock() = next;
        self.committed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *self.state.lock() = self.fallback;
        }
    }
}

/// Push 订阅管理器
pub struct SubscriptionManager {
    host: Arc<dyn PushHost>,
    ctx: AgentContext,
    state: Mutex<SubscriptionState>,
    /// 最近一次观察到的权限（仅用于展示）
    permission: Mutex<PermissionState>,
}

impl SubscriptionManager {
    /// 创建管理器，立即做能力探测
    pub fn new(host: Arc<dyn PushHost>, ctx: AgentContext) -> Self {
        let supported = host.capabilities().is_supported();
        let (state, permission) = if supported {
            (SubscriptionState::Unregistered, host.permission())
        } else {
            tracing::warn!("⚠️ 宿主不支持推送通知");
            (SubscriptionState::Unsupported, PermissionState::Default)
        };

        Self {
            host,
            ctx,
            state: Mutex::new(state),
            permission: Mutex::new(permission),
        }
    }

    /// 宿主是否具备全部所需能力
    pub fn check_support(&self) -> bool {
        self.host.capabilities().is_supported()
    }

    /// 当前状态
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// 最近一次观察到的权限
    pub fn permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    fn ensure_supported(&self) -> Result<()> {
        if self.state() == SubscriptionState::Unsupported || !self.check_support() {
            return Err(Error::UnsupportedCapability);
        }
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            current: self.state().name(),
            operation,
        }
    }

    /// 注册后台 Agent，并从宿主恢复订阅状态
    pub async fn register_agent(&self) -> Result<SubscriptionState> {
        self.ensure_supported()?;
        if matches!(
            self.state(),
            SubscriptionState::Subscribing | SubscriptionState::Unsubscribing
        ) {
            return Err(self.invalid("register_agent"));
        }

        let script = self.ctx.script_location.as_str();
        self.host.register_agent(script).await.map_err(|e| {
            tracing::error!("Agent registration failed: {}", e);
            Error::SubscriptionFailed(format!("register {}: {}", script, e))
        })?;
        tracing::info!("📝 Agent registered: {}", script);

        let next = match self.host.get_subscription().await {
            Ok(Some(sub)) => {
                tracing::debug!("🔁 恢复已有订阅: endpoint={}", sub.endpoint);
                SubscriptionState::Subscribed
            }
            Ok(None) => SubscriptionState::Unsubscribed,
            Err(e) => {
                tracing::warn!("查询已有订阅失败: {}", e);
                SubscriptionState::Unsubscribed
            }
        };
        *self.state.lock() = next;
        Ok(next)
    }

    /// 订阅 Push
    ///
    /// 权限请求会一直挂起直到用户响应。权限不是 granted 时不会调用宿主的
    /// subscribe。
    pub async fn subscribe(&self) -> Result<PushSubscription> {
        self.ensure_supported()?;
        let transition = Transition::begin(
            &self.state,
            &[SubscriptionState::Unsubscribed],
            SubscriptionState::Subscribing,
        )
        .map_err(|current| Error::InvalidState {
            current: current.name(),
            operation: "subscribe",
        })?;

        let application_server_key = match &self.ctx.vapid_public_key {
            Some(key) => Some(
                url_base64_to_bytes(key).map_err(|e| Error::SubscriptionFailed(e.to_string()))?,
            ),
            None => None,
        };

        let permission = self.host.request_permission().await;
        *self.permission.lock() = permission;
        if permission != PermissionState::Granted {
            tracing::info!("Notification permission denied ({})", permission);
            return Err(Error::PermissionDenied);
        }

        self.host
            .ready()
            .await
            .map_err(|e| Error::SubscriptionFailed(format!("agent not ready: {}", e)))?;

        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key,
        };
        let subscription = self.host.subscribe(&options).await.map_err(|e| match e {
            Error::SubscriptionFailed(_) => e,
            other => Error::SubscriptionFailed(other.to_string()),
        })?;

        transition.commit(SubscriptionState::Subscribed);
        tracing::info!("✅ Push subscription: endpoint={}", subscription.endpoint);
        Ok(subscription)
    }

    /// 取消订阅
    ///
    /// 宿主侧已经没有订阅时视为成功。
    pub async fn unsubscribe(&self) -> Result<()> {
        self.ensure_supported()?;
        let transition = Transition::begin(
            &self.state,
            &[SubscriptionState::Subscribed, SubscriptionState::Unsubscribed],
            SubscriptionState::Unsubscribing,
        )
        .map_err(|current| Error::InvalidState {
            current: current.name(),
            operation: "unsubscribe",
        })?;

        self.host
            .ready()
            .await
            .map_err(|e| Error::SubscriptionFailed(format!("agent not ready: {}", e)))?;

        let current = self
            .host
            .get_subscription()
            .await
            .map_err(|e| Error::SubscriptionFailed(e.to_string()))?;

        let Some(subscription) = current else {
            tracing::debug!("没有可取消的订阅");
            transition.commit(SubscriptionState::Unsubscribed);
            return Ok(());
        };

        match self.host.revoke(&subscription).await {
            Ok(true) => {
                transition.commit(SubscriptionState::Unsubscribed);
                tracing::info!("Unsubscribed from push notifications");
                Ok(())
            }
            Ok(false) => Err(Error::SubscriptionFailed(format!(
                "host refused to revoke {}",
                subscription.endpoint
            ))),
            Err(e) => Err(Error::SubscriptionFailed(e.to_string())),
        }
    }

    /// 是否已订阅（始终向宿主重新查询，不修改状态）
    pub async fn is_subscribed(&self) -> Result<bool> {
        self.ensure_supported()?;
        let current = self
            .host
            .get_subscription()
            .await
            .map_err(|e| Error::SubscriptionFailed(e.to_string()))?;
        Ok(current.is_some())
    }

    /// 订阅，失败时记录日志并返回 false
    pub async fn try_subscribe(&self) -> bool {
        match self.subscribe().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to subscribe: {}", e);
                false
            }
        }
    }

    /// 取消订阅，失败时记录日志并返回 false
    pub async fn try_unsubscribe(&self) -> bool {
        match self.unsubscribe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to unsubscribe: {}", e);
                false
            }
        }
    }

    /// 直接展示本地通知
    ///
    /// 不支持或未授权时静默跳过，返回是否展示。
    pub async fn send_local_notification(
        &self,
        title: &str,
        options: LocalNotificationOptions,
    ) -> Result<bool> {
        if !self.check_support() {
            return Ok(false);
        }
        let permission = self.host.permission();
        *self.permission.lock() = permission;
        if permission != PermissionState::Granted {
            return Ok(false);
        }

        let options = options.with_defaults(&self.ctx);
        self.host.show_local_notification(title, &options).await?;
        Ok(true)
    }
}

/// VAPID 公钥 (base64url，补齐可选) → 字节
pub fn url_base64_to_bytes(key: &str) -> Result<Vec<u8>> {
    let normalized: String = key
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| Error::Config(format!("invalid VAPID public key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_base64_to_bytes() {
        assert_eq!(url_base64_to_bytes("AQID").unwrap(), vec![1, 2, 3]);
        // base64url 字符
        assert_eq!(url_base64_to_bytes("-_8").unwrap(), vec![0xfb, 0xff]);
        // 标准字符与补齐也接受
        assert_eq!(url_base64_to_bytes("+/8=").unwrap(), vec![0xfb, 0xff]);
        assert!(url_base64_to_bytes("not base64!").is_err());
    }

    #[test]
    fn test_transition_checks_and_sets_under_one_lock() {
        let state = Mutex::new(SubscriptionState::Unsubscribed);

        let first = Transition::begin(
            &state,
            &[SubscriptionState::Unsubscribed],
            SubscriptionState::Subscribing,
        )
        .unwrap();
        assert_eq!(*state.lock(), SubscriptionState::Subscribing);

        // 第二个调用者看到的是过渡状态
        let second = Transition::begin(
            &state,
            &[SubscriptionState::Unsubscribed],
            SubscriptionState::Subscribing,
        );
        assert_eq!(second.err(), Some(SubscriptionState::Subscribing));

        drop(first);
        assert_eq!(*state.lock(), SubscriptionState::Unsubscribed);
    }

    #[test]
    fn test_transition_commit_keeps_next_state() {
        let state = Mutex::new(SubscriptionState::Subscribed);
        let transition = Transition::begin(
            &state,
            &[SubscriptionState::Subscribed],
            SubscriptionState::Unsubscribing,
        )
        .unwrap();
        transition.commit(SubscriptionState::Unsubscribed);
        assert_eq!(*state.lock(), SubscriptionState::Unsubscribed);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SubscriptionState::Subscribed.to_string(), "subscribed");
        assert_eq!(SubscriptionState::Unsupported.name(), "unsupported");
    }
}
