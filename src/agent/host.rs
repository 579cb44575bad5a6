//! Socket 宿主
//!
//! 守护进程模式下的 [`Host`] 实现：
//! - 资源从静态目录读取
//! - Client 列表由连接方通过 `UpdateClients` 上报
//! - 通知、窗口、提醒等动作作为 [`Push`] 广播给订阅者

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::broadcaster::Broadcaster;
use crate::error::{Error, Result};
use crate::host::{ClientKind, ClientView, Host};
use crate::notification::DisplayedNotification;
use crate::protocol::Push;

/// Socket 宿主
pub struct SocketHost {
    broadcaster: Arc<Broadcaster>,
    /// 静态资源根目录
    static_root: PathBuf,
    /// 当前缓存版本（Ready 推送用）
    cache_version: String,
    /// 已打开的 Client（枚举顺序）
    clients: RwLock<Vec<ClientView>>,
}

impl SocketHost {
    pub fn new(broadcaster: Arc<Broadcaster>, static_root: PathBuf, cache_version: String) -> Arc<Self> {
        Arc::new(Self {
            broadcaster,
            static_root,
            cache_version,
            clients: RwLock::new(Vec::new()),
        })
    }

    /// 替换 Client 列表
    pub fn set_clients(&self, clients: Vec<ClientView>) {
        tracing::debug!("🪟 Client 列表更新: {} 个", clients.len());
        *self.clients.write() = clients;
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// 资源 key → 静态目录下的文件路径
    ///
    /// `/` 映射到 `index.html`；拒绝 `..` 等跳出根目录的路径。
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        let path = key.split(['?', '#']).next().unwrap_or_default();
        let relative = path.trim_start_matches('/');
        let relative = if relative.is_empty() || relative.ends_with('/') {
            format!("{}index.html", relative)
        } else {
            relative.to_string()
        };

        let relative = Path::new(&relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.static_root.join(relative))
    }
}

#[async_trait]
impl Host for SocketHost {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key).ok_or_else(|| Error::Fetch {
            key: key.to_string(),
            reason: "path escapes static root".to_string(),
        })?;

        tokio::fs::read(&path).await.map_err(|e| Error::Fetch {
            key: key.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }

    async fn skip_waiting(&self) -> Result<()> {
        self.broadcaster.broadcast(Push::Ready {
            version: self.cache_version.clone(),
        });
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.broadcaster.broadcast(Push::Claimed);
        Ok(())
    }

    async fn show_notification(&self, notification: &DisplayedNotification) -> Result<()> {
        let delivered = self.broadcaster.broadcast(Push::ShowNotification {
            notification: notification.clone(),
        });
        if delivered == 0 {
            tracing::warn!("⚠️ 没有订阅通知的连接，通知未送达: id={}", notification.id);
        }
        Ok(())
    }

    async fn close_notification(&self, notification_id: &str) -> Result<()> {
        self.broadcaster.broadcast(Push::CloseNotification {
            notification_id: notification_id.to_string(),
        });
        Ok(())
    }

    async fn match_all(&self, kind: ClientKind) -> Result<Vec<ClientView>> {
        Ok(self
            .clients
            .read()
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect())
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        self.broadcaster.broadcast(Push::FocusClient {
            client_id: client_id.to_string(),
        });
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<Option<ClientView>> {
        let client = ClientView {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            kind: ClientKind::Window,
            focusable: true,
        };
        self.clients.write().push(client.clone());
        self.broadcaster.broadcast(Push::OpenWindow {
            client_id: client.id.clone(),
            url: url.to_string(),
        });
        Ok(Some(client))
    }

    async fn check_reminders(&self, tag: &str) -> Result<()> {
        self.broadcaster.broadcast(Push::ReminderCheck {
            tag: tag.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(root: &str) -> Arc<SocketHost> {
        SocketHost::new(Broadcaster::new(), PathBuf::from(root), "mindmesh-v1".to_string())
    }

    #[test]
    fn test_resolve() {
        let host = host("/srv/static");
        assert_eq!(host.resolve("/"), Some(PathBuf::from("/srv/static/index.html")));
        assert_eq!(
            host.resolve("/index.html"),
            Some(PathBuf::from("/srv/static/index.html"))
        );
        assert_eq!(
            host.resolve("/assets/app.js?v=3"),
            Some(PathBuf::from("/srv/static/assets/app.js"))
        );
        assert_eq!(
            host.resolve("/docs/"),
            Some(PathBuf::from("/srv/static/docs/index.html"))
        );
        assert_eq!(host.resolve("/../etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_open_window_registers_client() {
        let host = host("/srv/static");
        let opened = host.open_window("/dashboard").await.unwrap().unwrap();

        let windows = host.match_all(ClientKind::Window).await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, opened.id);
        assert!(host.match_all(ClientKind::Worker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let host = host(tmp.path().to_str().unwrap());
        let err = host.fetch("/missing.css").await.unwrap_err();
        assert!(matches!(err, Error::Fetch { ref key, .. } if key == "/missing.css"));
    }
}
