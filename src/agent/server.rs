//! Agent 服务器
//!
//! Unix Socket 上的事件入口。退出条件：
//! - 没有连接、也没有未结束的事件，并且持续 `idle_timeout_secs`
//! - 收到中断信号
//!
//! 两种情况都会先等在途事件结束（最多 `drain_grace_secs`），再删除 socket / PID 文件。

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};

use super::broadcaster::Broadcaster;
use super::handler::Handler;
use super::host::SocketHost;
use crate::cache::CacheStore;
use crate::config::{AgentContext, CacheConfig};
use crate::dispatch::ServiceAgent;
use crate::protocol::{Request, Response};

/// 单连接写通道容量（响应 + 推送）
const LINE_CHANNEL_CAPACITY: usize = 100;

/// Agent 配置
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// 数据目录（默认 ~/.mindmesh）
    pub data_dir: PathBuf,
    /// 空闲超时（秒）
    pub idle_timeout_secs: u64,
    /// 退出前等待在途事件的最长时间（秒）
    pub drain_grace_secs: u64,
    /// 静态资源目录（默认 data_dir/static）
    pub static_dir: Option<PathBuf>,
    /// 事件处理上下文
    pub context: AgentContext,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_dir = std::env::var("MINDMESH_AGENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".mindmesh")
            });

        Self {
            data_dir,
            idle_timeout_secs: 30,
            drain_grace_secs: 10,
            static_dir: std::env::var("MINDMESH_STATIC_DIR").ok().map(PathBuf::from),
            context: AgentContext::from_env(),
        }
    }
}

impl AgentConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("agent.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("agent.pid")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("resources.db")
    }

    /// 静态资源目录
    pub fn static_root(&self) -> PathBuf {
        self.static_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("static"))
    }
}

/// 运行期文件：socket + PID
struct RuntimeFiles {
    socket: PathBuf,
    pid: PathBuf,
}

impl RuntimeFiles {
    fn of(config: &AgentConfig) -> Self {
        Self {
            socket: config.socket_path(),
            pid: config.pid_path(),
        }
    }

    /// PID 文件指向的进程仍然存活时返回其 PID
    fn running_pid(&self) -> Option<i32> {
        let pid: i32 = fs::read_to_string(&self.pid).ok()?.trim().parse().ok()?;
        // 信号 0 只探测进程是否存在
        let alive = unsafe { libc::kill(pid, 0) == 0 };
        alive.then_some(pid)
    }

    /// 绑定 socket（0600）并写入 PID 文件
    fn bind(&self) -> Result<UnixListener> {
        remove_if_exists(&self.socket)?;
        let listener = UnixListener::bind(&self.socket)
            .with_context(|| format!("绑定 socket 失败: {}", self.socket.display()))?;
        fs::set_permissions(&self.socket, fs::Permissions::from_mode(0o600))?;

        fs::write(&self.pid, std::process::id().to_string())?;
        fs::set_permissions(&self.pid, fs::Permissions::from_mode(0o600))?;
        Ok(listener)
    }

    fn remove(&self) -> io::Result<()> {
        remove_if_exists(&self.socket)?;
        remove_if_exists(&self.pid)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Agent 服务
pub struct Agent {
    config: AgentConfig,
    files: RuntimeFiles,
    service: Arc<ServiceAgent>,
    broadcaster: Arc<Broadcaster>,
    handler: Handler,
}

impl Agent {
    /// 创建 Agent：打开缓存存储，组装 Socket 宿主
    pub fn new(config: AgentConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).context("创建数据目录失败")?;

        let cache = Arc::new(
            CacheStore::open(CacheConfig::local(config.cache_db_path()))
                .context("打开缓存存储失败")?,
        );

        let broadcaster = Broadcaster::new();
        let host = SocketHost::new(
            broadcaster.clone(),
            config.static_root(),
            config.context.cache_version.clone(),
        );
        let service = ServiceAgent::new(config.context.clone(), cache, host.clone());
        let handler = Handler::new(service.clone(), broadcaster.clone(), host);

        Ok(Self {
            files: RuntimeFiles::of(&config),
            config,
            service,
            broadcaster,
            handler,
        })
    }

    /// 运行直到空闲超时或收到中断信号
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = self.files.bind()?;
        tracing::info!(
            "🚀 Agent 启动: {:?} (cache_version={}, static_root={:?})",
            self.files.socket,
            self.config.context.cache_version,
            self.config.static_root()
        );

        let idle_limit = Duration::from_secs(self.config.idle_timeout_secs.max(1));
        let mut idle_since = Instant::now();
        let mut tick = interval(Duration::from_secs(1));
        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let agent = self.clone();
                        tokio::spawn(async move { agent.serve(stream).await });
                    }
                    Err(e) => tracing::error!("接受连接失败: {}", e),
                },
                _ = tick.tick() => {
                    if self.is_busy() {
                        idle_since = Instant::now();
                    } else if idle_since.elapsed() >= idle_limit {
                        tracing::info!("⏰ 空闲 {}s，退出", self.config.idle_timeout_secs);
                        break;
                    }
                }
                _ = &mut interrupted => {
                    tracing::info!("收到中断信号，退出");
                    break;
                }
            }
        }

        drop(listener);
        self.drain().await;
        if let Err(e) = self.files.remove() {
            tracing::warn!("清理 socket / PID 文件失败: {}", e);
        }
        tracing::info!("🧹 Agent 已停止");
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.broadcaster.connection_count() > 0 || self.service.pending_events() > 0
    }

    /// 等在途事件结束（宿主在事件未完成前不得回收 Agent）
    async fn drain(&self) {
        let deadline = Instant::now() + Duration::from_secs(self.config.drain_grace_secs);
        while self.service.pending_events() > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "⚠️ 仍有 {} 个事件未结束，放弃等待",
                    self.service.pending_events()
                );
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// 服务单个连接：逐行读请求，响应与推送经同一写通道按序写出
    async fn serve(&self, stream: UnixStream) {
        let (reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let conn_id = self.broadcaster.register(tx);
        tracing::debug!("📥 新连接: conn_id={}", conn_id);

        let writer_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("读取失败: conn_id={}: {}", conn_id, e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handler.handle(conn_id, request).await,
                Err(e) => {
                    tracing::warn!("解析请求失败: {}", e);
                    Response::Error {
                        code: 400,
                        message: format!("Invalid JSON: {}", e),
                    }
                }
            };
            if !self.broadcaster.reply(conn_id, &response).await {
                break;
            }
        }

        // 注销后写通道关闭，写任务把剩余行写完后退出
        self.broadcaster.unregister(conn_id);
        let _ = writer_task.await;
        tracing::debug!("📤 连接关闭: conn_id={}", conn_id);
    }
}

/// PID 文件指向的 Agent 是否仍在运行
pub fn is_agent_running(config: &AgentConfig) -> bool {
    RuntimeFiles::of(config).running_pid().is_some()
}

/// 删除上次异常退出留下的 socket / PID 文件
pub fn cleanup_stale_agent(config: &AgentConfig) -> Result<()> {
    RuntimeFiles::of(config)
        .remove()
        .context("清理残留 Agent 文件失败")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AgentConfig {
        AgentConfig {
            data_dir: dir.path().to_path_buf(),
            idle_timeout_secs: 1,
            drain_grace_secs: 1,
            static_dir: None,
            context: AgentContext::default(),
        }
    }

    #[test]
    fn test_stale_pid_is_not_running() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert!(!is_agent_running(&config));

        fs::write(config.pid_path(), "not-a-pid").unwrap();
        assert!(!is_agent_running(&config));

        fs::write(config.pid_path(), std::process::id().to_string()).unwrap();
        assert!(is_agent_running(&config));

        cleanup_stale_agent(&config).unwrap();
        assert!(!config.pid_path().exists());
        // 文件已不存在时再次清理也成功
        cleanup_stale_agent(&config).unwrap();
    }
}
