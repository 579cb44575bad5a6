//! Agent 守护进程 - Unix Socket + 事件投递 + 动作推送
//!
//! 守护进程把 [`ServiceAgent`](crate::dispatch::ServiceAgent) 挂在 Unix Socket 上：
//! - 宿主连接投递生命周期事件（`Dispatch`），事件处理完成后才响应
//! - 宿主连接上报已打开的 Client（`UpdateClients`）
//! - 通知展示、窗口聚焦等动作推送给订阅者

mod broadcaster;
mod handler;
mod host;
mod server;

// Re-export protocol types from crate root
pub use crate::protocol::{EventType, Push, Request, Response};
pub use host::SocketHost;
pub use server::{Agent, AgentConfig, cleanup_stale_agent, is_agent_running};
