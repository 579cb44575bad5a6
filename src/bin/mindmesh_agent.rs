//! mindmesh-agent - 后台通知 Agent
//!
//! 负责：
//! - 资源预缓存 / 过期版本清理
//! - Push → 通知
//! - 通知点击路由
//! - 提醒唤醒

use std::sync::Arc;

use anyhow::Result;
use mindmesh_push_agent::agent::{Agent, AgentConfig, cleanup_stale_agent, is_agent_running};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("mindmesh_push_agent=debug".parse()?))
        .init();

    tracing::info!("🚀 mindmesh-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::default();

    // 检查是否已有 Agent 运行
    if is_agent_running(&config) {
        tracing::error!("❌ Agent is already running, exiting");
        std::process::exit(1);
    }

    // 清理残留状态
    if let Err(e) = cleanup_stale_agent(&config) {
        tracing::warn!("Failed to cleanup stale state: {}", e);
    }

    let agent = Arc::new(Agent::new(config)?);
    agent.run().await?;

    tracing::info!("👋 mindmesh-agent exiting");
    Ok(())
}
