//! 缓存存储 Schema 定义

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Schema 版本，记录在 `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// 核心 Schema SQL
pub const SCHEMA_SQL: &str = r#"
-- 缓存版本表（一个版本 = 一次 install 的完整快照）
CREATE TABLE IF NOT EXISTS cache_versions (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
);

-- 缓存条目（写入后不可变，只随版本整体删除）
CREATE TABLE IF NOT EXISTS cache_entries (
    version TEXT NOT NULL REFERENCES cache_versions(name),
    key TEXT NOT NULL,
    body BLOB NOT NULL,
    position INTEGER NOT NULL,      -- manifest 中的顺序
    size INTEGER NOT NULL,          -- 字节数
    stored_at INTEGER NOT NULL,     -- 毫秒时间戳
    PRIMARY KEY (version, key)
);

-- 索引
CREATE INDEX IF NOT EXISTS idx_cache_entries_version ON cache_entries(version, position);
"#;

/// 建表并写入 schema 版本
///
/// 新版本 Agent 写过的存储不认识，直接拒绝打开。
pub fn apply(conn: &Connection) -> Result<()> {
    let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(Error::Config(format!(
            "cache store schema v{} is newer than supported v{}",
            found, SCHEMA_VERSION
        )));
    }

    conn.execute_batch(SCHEMA_SQL)?;
    if found < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::debug!("缓存存储 schema: v{} -> v{}", found, SCHEMA_VERSION);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> i64 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_apply_fresh_store() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn).unwrap();
        assert_eq!(user_version(&conn), SCHEMA_VERSION);

        // 幂等
        apply(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name LIKE 'cache_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_apply_rejects_newer_store() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        assert!(matches!(apply(&conn), Err(Error::Config(_))));
    }
}
