//! 通知点击路由
//!
//! 点击后先关闭通知；只有主操作 (`explore`) 会继续路由：
//! 优先聚焦根路径的已有窗口（枚举顺序第一个），否则打开 dashboard。

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::AgentContext;
use crate::error::Result;
use crate::host::{ClientKind, ClientView, Host};
use crate::notification::{ACTION_CLOSE, ACTION_EXPLORE};

/// 用户对通知的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// 主操作
    Explore,
    /// 次操作
    Close,
    /// 点击通知本体（无 action）
    Body,
    /// 未知操作
    Other(String),
}

impl ClickAction {
    pub fn parse(action: Option<&str>) -> Self {
        match action {
            None | Some("") => ClickAction::Body,
            Some(ACTION_EXPLORE) => ClickAction::Explore,
            Some(ACTION_CLOSE) => ClickAction::Close,
            Some(other) => ClickAction::Other(other.to_string()),
        }
    }
}

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// 聚焦了已有窗口
    Focused { client_id: String },
    /// 打开了新窗口
    Opened {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
    /// 宿主不支持打开窗口
    NoWindow,
    /// 只关闭通知
    Dismissed,
}

/// 取 URL 的路径部分（相对路径按同源处理）
pub fn url_path(raw: &str) -> Option<String> {
    let base = Url::parse("http://localhost/").ok()?;
    base.join(raw).ok().map(|u| u.path().to_string())
}

/// 在已打开的窗口中找第一个位于根路径且可聚焦的
pub fn find_root_client<'a>(ctx: &AgentContext, clients: &'a [ClientView]) -> Option<&'a ClientView> {
    let root = url_path(&ctx.root_path).unwrap_or_else(|| ctx.root_path.clone());
    clients.iter().find(|client| {
        client.kind == ClientKind::Window
            && client.focusable
            && url_path(&client.url).as_deref() == Some(root.as_str())
    })
}

/// 处理一次通知点击
pub async fn route_click(
    ctx: &AgentContext,
    host: &dyn Host,
    notification_id: &str,
    action: Option<&str>,
) -> Result<ClickOutcome> {
    // 无论走哪个分支都先关闭
    host.close_notification(notification_id).await?;

    let action = ClickAction::parse(action);
    if action != ClickAction::Explore {
        tracing::debug!("👆 通知已关闭: id={}, action={:?}", notification_id, action);
        return Ok(ClickOutcome::Dismissed);
    }

    let clients = host.match_all(ClientKind::Window).await?;
    if let Some(client) = find_root_client(ctx, &clients) {
        tracing::debug!("👆 聚焦已有窗口: client_id={}, url={}", client.id, client.url);
        host.focus(&client.id).await?;
        return Ok(ClickOutcome::Focused {
            client_id: client.id.clone(),
        });
    }

    match host.open_window(&ctx.dashboard_route).await? {
        Some(opened) => {
            tracing::debug!("👆 打开新窗口: url={}", ctx.dashboard_route);
            Ok(ClickOutcome::Opened {
                url: ctx.dashboard_route.clone(),
                client_id: Some(opened.id),
            })
        }
        None => {
            tracing::debug!("👆 宿主不支持打开窗口");
            Ok(ClickOutcome::NoWindow)
        }
    }
}
