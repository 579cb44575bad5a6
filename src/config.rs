//! 配置
//!
//! - [`CacheConfig`]: 资源缓存存储位置
//! - [`AgentContext`]: 每个事件处理器共享的只读上下文

use std::path::PathBuf;

/// 缓存存储配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 连接 URL
    /// - 本地: SQLite 文件路径
    /// - 内存: ":memory:"
    pub url: String,

    /// 连接模式
    pub mode: ConnectionMode,
}

/// 连接模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// 本地 SQLite 文件
    Local,
    /// 进程内内存库（测试 / 临时 Agent）
    Memory,
}

impl CacheConfig {
    /// 创建本地 SQLite 配置
    pub fn local<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            url: path.display().to_string(),
            mode: ConnectionMode::Local,
        }
    }

    /// 创建内存库配置
    pub fn in_memory() -> Self {
        Self {
            url: ":memory:".to_string(),
            mode: ConnectionMode::Memory,
        }
    }

    /// 从环境变量或默认路径创建配置
    pub fn from_env() -> Self {
        if let Ok(url) = std::env::var("MINDMESH_CACHE_DB") {
            if url == ":memory:" {
                return Self::in_memory();
            }
            return Self::local(url);
        }

        // 默认路径: ~/.mindmesh/cache/resources.db
        let default_path = dirs::home_dir()
            .map(|h| h.join(".mindmesh").join("cache").join("resources.db"))
            .unwrap_or_else(|| PathBuf::from("resources.db"));

        Self::local(default_path)
    }

    /// 获取数据库文件路径 (仅本地模式)
    pub fn path(&self) -> Option<PathBuf> {
        match self.mode {
            ConnectionMode::Local => Some(PathBuf::from(&self.url)),
            ConnectionMode::Memory => None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// 应用名称（通知默认标题）
pub const DEFAULT_APP_NAME: &str = "MindMesh AI";

/// 通知默认正文
pub const DEFAULT_BODY: &str = "You have a new notification";

/// 当前缓存版本
pub const DEFAULT_CACHE_VERSION: &str = "mindmesh-v1";

/// 一次性唤醒的提醒 tag
pub const GOAL_REMINDER_TAG: &str = "goal-reminder";

/// 周期唤醒的提醒 tag
pub const CHECK_GOALS_TAG: &str = "check-goals";

/// Agent 上下文
///
/// 处理器是 (事件, 上下文, 宿主查询结果) 的函数，不依赖任何模块级全局状态。
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// 当前缓存版本，其他版本在 activate 时全部删除
    pub cache_version: String,
    /// install 时预缓存的资源 key（有序）
    pub manifest: Vec<String>,
    /// 应用名称
    pub app_name: String,
    /// 默认通知正文
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    /// 振动模式（毫秒）
    pub vibrate: Vec<u32>,
    /// 应用根路径，点击通知时优先聚焦此路径的窗口
    pub root_path: String,
    /// 没有可聚焦窗口时打开的路由
    pub dashboard_route: String,
    /// Agent 脚本位置（注册用）
    pub script_location: String,
    /// VAPID 公钥 (base64url)，未配置时订阅不带 applicationServerKey
    pub vapid_public_key: Option<String>,
}

impl Default for AgentContext {
    fn default() -> Self {
        Self {
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            manifest: vec!["/".to_string(), "/index.html".to_string()],
            app_name: DEFAULT_APP_NAME.to_string(),
            default_body: DEFAULT_BODY.to_string(),
            icon: "/favicon.ico".to_string(),
            badge: "/favicon.ico".to_string(),
            vibrate: vec![100, 50, 100],
            root_path: "/".to_string(),
            dashboard_route: "/dashboard".to_string(),
            script_location: "/sw.js".to_string(),
            vapid_public_key: None,
        }
    }
}

impl AgentContext {
    /// 从环境变量覆盖默认值
    pub fn from_env() -> Self {
        let mut ctx = Self::default();

        if let Ok(version) = std::env::var("MINDMESH_CACHE_VERSION") {
            if !version.trim().is_empty() {
                ctx.cache_version = version;
            }
        }
        if let Ok(name) = std::env::var("MINDMESH_APP_NAME") {
            if !name.trim().is_empty() {
                ctx.app_name = name;
            }
        }
        if let Ok(key) = std::env::var("MINDMESH_VAPID_PUBLIC_KEY") {
            if !key.trim().is_empty() {
                ctx.vapid_public_key = Some(key);
            }
        }

        ctx
    }

    /// 设置缓存版本
    pub fn with_cache_version(mut self, version: impl Into<String>) -> Self {
        self.cache_version = version.into();
        self
    }

    /// 设置预缓存清单
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = manifest.into_iter().map(Into::into).collect();
        self
    }
}
