// ==========================================
// 选修课分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::section::SECTION_CAPACITY;
use crate::domain::types::TieBreak;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 默认落库分片大小
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

// ==========================================
// AllotmentConfig - 分配运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentConfig {
    pub section_capacity: u32,  // 班级容量
    pub chunk_size: usize,      // 成员关系落库分片
    pub tie_break: TieBreak,    // 学生处理顺序
}

impl Default for AllotmentConfig {
    fn default() -> Self {
        Self {
            section_capacity: SECTION_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            tie_break: TieBreak::default(),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    // ===== 分配参数 =====

    /// 班级容量（非法值回退默认 70）
    pub fn get_section_capacity(&self) -> Result<u32, Box<dyn Error>> {
        let default = SECTION_CAPACITY.to_string();
        let value = self.get_config_or_default(config_keys::SECTION_CAPACITY, &default)?;
        match value.trim().parse::<u32>() {
            Ok(v) if v > 0 => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = config_keys::SECTION_CAPACITY,
                    value = %value,
                    "班级容量配置非法，使用默认值 {}",
                    SECTION_CAPACITY
                );
                Ok(SECTION_CAPACITY)
            }
        }
    }

    /// 落库分片大小（非法值回退默认 1000）
    pub fn get_chunk_size(&self) -> Result<usize, Box<dyn Error>> {
        let default = DEFAULT_CHUNK_SIZE.to_string();
        let value = self.get_config_or_default(config_keys::MATERIALIZE_CHUNK_SIZE, &default)?;
        match value.trim().parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = config_keys::MATERIALIZE_CHUNK_SIZE,
                    value = %value,
                    "分片大小配置非法，使用默认值 {}",
                    DEFAULT_CHUNK_SIZE
                );
                Ok(DEFAULT_CHUNK_SIZE)
            }
        }
    }

    pub fn get_tie_break(&self) -> Result<TieBreak, Box<dyn Error>> {
        let value = self.get_config_or_default(
            config_keys::TIE_BREAK,
            TieBreak::default().to_db_str(),
        )?;
        Ok(TieBreak::from_db_str(&value).unwrap_or_else(|| {
            tracing::warn!(config_key = config_keys::TIE_BREAK, value = %value, "未知排序方式，使用学号排序");
            TieBreak::default()
        }))
    }

    /// 读取完整分配参数
    pub fn load_allotment_config(&self) -> Result<AllotmentConfig, Box<dyn Error>> {
        Ok(AllotmentConfig {
            section_capacity: self.get_section_capacity()?,
            chunk_size: self.get_chunk_size()?,
            tie_break: self.get_tie_break()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分班
    pub const SECTION_CAPACITY: &str = "section_capacity";

    // 落库
    pub const MATERIALIZE_CHUNK_SIZE: &str = "materialize_chunk_size";

    // 排序
    pub const TIE_BREAK: &str = "tie_break";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cm = manager();
        assert_eq!(cm.load_allotment_config().unwrap(), AllotmentConfig::default());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let cm = manager();
        cm.set_global_config_value(config_keys::SECTION_CAPACITY, "40").unwrap();
        cm.set_global_config_value(config_keys::MATERIALIZE_CHUNK_SIZE, "0").unwrap();
        cm.set_global_config_value(config_keys::TIE_BREAK, "discovery").unwrap();

        let cfg = cm.load_allotment_config().unwrap();
        assert_eq!(cfg.section_capacity, 40);
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.tie_break, TieBreak::Discovery);

        cm.set_global_config_value(config_keys::SECTION_CAPACITY, "abc").unwrap();
        assert_eq!(cm.get_section_capacity().unwrap(), SECTION_CAPACITY);
    }
}
