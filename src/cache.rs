//! 资源缓存存储
//!
//! 版本化的 key → blob 存储：
//! - install 时按 manifest 全量预缓存（全有或全无）
//! - activate 时删除当前版本以外的所有版本
//!
//! 条目写入后不可变，也不会单独淘汰，所以没有 LRU 之类的策略。

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::{CacheConfig, ConnectionMode};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::schema;

/// 缓存条目摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    pub key: String,
    pub size: i64,
    pub stored_at: i64,
}

/// 预缓存结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateResult {
    pub version: String,
    pub entries: usize,
    pub bytes: usize,
}

/// 资源缓存存储
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// 打开缓存存储
    pub fn open(config: CacheConfig) -> Result<Self> {
        let conn = match config.mode {
            ConnectionMode::Local => {
                let path = Path::new(&config.url);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            ConnectionMode::Memory => Connection::open_in_memory()?,
        };

        schema::apply(&conn)?;

        tracing::info!("缓存存储已打开: {}", config.url);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 打开内存存储
    pub fn in_memory() -> Result<Self> {
        Self::open(CacheConfig::in_memory())
    }

    /// 按 manifest 预缓存一个版本
    ///
    /// 先拉取全部资源，任一失败即返回错误且不写入任何内容；
    /// 全部成功后在一个事务里写入。
    pub async fn populate(
        &self,
        version: &str,
        manifest: &[String],
        fetcher: &dyn Host,
    ) -> Result<PopulateResult> {
        let mut fetched = Vec::with_capacity(manifest.len());
        for key in manifest {
            match fetcher.fetch(key).await {
                Ok(body) => fetched.push((key.as_str(), body)),
                Err(e) => {
                    tracing::warn!("❌ 预缓存失败: version={}, key={}: {}", version, key, e);
                    return Err(match e {
                        Error::Fetch { .. } => e,
                        other => Error::Fetch {
                            key: key.clone(),
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut bytes = 0usize;

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO cache_versions (name) VALUES (?1)",
            params![version],
        )?;
        for (position, (key, body)) in fetched.iter().enumerate() {
            bytes += body.len();
            // 同版本重复 install：条目内容不变，保留首次写入
            tx.execute(
                "INSERT OR IGNORE INTO cache_entries (version, key, body, position, size, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![version, key, body, position as i64, body.len() as i64, now],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            "📦 预缓存完成: version={}, entries={}, bytes={}",
            version,
            fetched.len(),
            bytes
        );

        Ok(PopulateResult {
            version: version.to_string(),
            entries: fetched.len(),
            bytes,
        })
    }

    /// 删除 `current` 以外的所有版本，返回被删除的版本名
    pub fn prune_except(&self, current: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let stale: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT name FROM cache_versions WHERE name != ?1
                 UNION
                 SELECT DISTINCT version FROM cache_entries WHERE version != ?1",
            )?;
            let rows = stmt.query_map(params![current], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        for name in &stale {
            tx.execute("DELETE FROM cache_entries WHERE version = ?1", params![name])?;
            tx.execute("DELETE FROM cache_versions WHERE name = ?1", params![name])?;
        }
        tx.commit()?;

        if stale.is_empty() {
            tracing::debug!("🧹 没有过期缓存版本: current={}", current);
        } else {
            tracing::info!("🧹 删除过期缓存版本: {:?} (current={})", stale, current);
        }

        Ok(stale)
    }

    /// 所有存在的版本名
    pub fn versions(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM cache_versions ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    /// 版本下的所有 key（manifest 顺序）
    pub fn keys(&self, version: &str) -> Result<Vec<String>> {
        Ok(self.entries(version)?.into_iter().map(|e| e.key).collect())
    }

    /// 版本下的条目摘要
    pub fn entries(&self, version: &str) -> Result<Vec<CacheEntryInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, size, stored_at FROM cache_entries WHERE version = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![version], |row| {
            Ok(CacheEntryInfo {
                key: row.get(0)?,
                size: row.get(1)?,
                stored_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 读取条目内容
    pub fn get(&self, version: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let body = conn
            .query_row(
                "SELECT body FROM cache_entries WHERE version = ?1 AND key = ?2",
                params![version, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// 获取底层连接 (用于测试)
    #[doc(hidden)]
    pub fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }
}
