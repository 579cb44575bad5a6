//! 错误类型定义

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 宿主缺少必需能力（Agent 注册 / Push / 通知展示），不可重试
    #[error("宿主不支持推送通知所需能力")]
    UnsupportedCapability,

    /// 用户拒绝了通知权限，需用户在宿主设置中重新授权
    #[error("通知权限被拒绝")]
    PermissionDenied,

    /// 订阅 / 取消订阅过程中宿主或网络失败
    #[error("订阅失败: {0}")]
    SubscriptionFailed(String),

    /// 当前状态不允许该操作
    #[error("状态错误: 当前为 {current}，无法执行 {operation}")]
    InvalidState {
        current: &'static str,
        operation: &'static str,
    },

    /// 资源拉取失败（install 阶段全有或全无）
    #[error("资源拉取失败: {key}: {reason}")]
    Fetch { key: String, reason: String },

    /// 宿主调用失败
    #[error("宿主错误: {0}")]
    Host(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 是否为终止性错误（重试无意义）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::UnsupportedCapability | Error::PermissionDenied)
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;
