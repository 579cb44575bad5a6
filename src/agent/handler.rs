//! 请求处理器
//!
//! 处理来自宿主连接的各类请求

use std::sync::Arc;

use super::broadcaster::{Broadcaster, ConnId};
use super::host::SocketHost;
use crate::dispatch::ServiceAgent;
use crate::protocol::{LifecycleEvent, QueryType, Request, Response};

/// Agent 版本号（跟随 crate 版本）
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 请求处理器
pub struct Handler {
    /// 事件处理核心
    agent: Arc<ServiceAgent>,
    /// 广播器
    broadcaster: Arc<Broadcaster>,
    /// Socket 宿主
    host: Arc<SocketHost>,
}

impl Handler {
    /// 创建处理器
    pub fn new(agent: Arc<ServiceAgent>, broadcaster: Arc<Broadcaster>, host: Arc<SocketHost>) -> Self {
        Self {
            agent,
            broadcaster,
            host,
        }
    }

    /// 处理请求
    pub async fn handle(&self, conn_id: ConnId, request: Request) -> Response {
        match request {
            Request::Handshake { component, version } => {
                tracing::info!(
                    "🤝 握手: conn_id={}, component={}, version={}",
                    conn_id,
                    component,
                    version
                );
                Response::HandshakeOk {
                    agent_version: AGENT_VERSION.to_string(),
                }
            }

            Request::Subscribe { events } => {
                self.broadcaster.set_interest(conn_id, &events, true);
                Response::Ok
            }

            Request::Unsubscribe { events } => {
                self.broadcaster.set_interest(conn_id, &events, false);
                Response::Ok
            }

            Request::Dispatch { event } => self.handle_dispatch(event).await,

            Request::UpdateClients { clients } => {
                self.host.set_clients(clients);
                Response::Ok
            }

            Request::Heartbeat => Response::Ok,

            Request::Query { query_type } => self.handle_query(query_type),
        }
    }

    /// 处理生命周期事件
    ///
    /// 事件处理完成（即"未完成工作"全部结束）后才响应。
    async fn handle_dispatch(&self, event: LifecycleEvent) -> Response {
        let name = event.name();
        match self.agent.spawn(event).await {
            Ok(Ok(outcome)) => Response::Dispatched { outcome },
            Ok(Err(e)) => Response::Error {
                code: 500,
                message: format!("{} failed: {}", name, e),
            },
            Err(e) => {
                tracing::error!("Event task aborted: {}: {}", name, e);
                Response::Error {
                    code: 500,
                    message: format!("{} task aborted: {}", name, e),
                }
            }
        }
    }

    /// 处理查询
    fn handle_query(&self, query_type: QueryType) -> Response {
        match query_type {
            QueryType::Status => {
                let status = serde_json::json!({
                    "agent_version": AGENT_VERSION,
                    "connections": self.broadcaster.connection_count(),
                    "pending_events": self.agent.pending_events(),
                    "cache_version": self.agent.context().cache_version,
                    "clients": self.host.client_count(),
                });
                Response::QueryResult { data: status }
            }
            QueryType::ConnectionCount => {
                let count = self.broadcaster.connection_count();
                Response::QueryResult {
                    data: serde_json::json!({ "count": count }),
                }
            }
            QueryType::CacheVersions => match self.agent.cache().versions() {
                Ok(versions) => Response::QueryResult {
                    data: serde_json::json!({ "versions": versions }),
                },
                Err(e) => {
                    tracing::error!("Failed to list cache versions: {}", e);
                    Response::Error {
                        code: 500,
                        message: format!("Failed to list cache versions: {}", e),
                    }
                }
            },
        }
    }
}
