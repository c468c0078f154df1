// ==========================================
// 选修课分配系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表脚本集中于此，测试与 CLI 共用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS subject (
    subject_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    program_ids_json TEXT NOT NULL DEFAULT '[]',
    allotment_type TEXT NOT NULL CHECK (allotment_type IN ('STANDALONE', 'BUCKET')),
    preference_window_open INTEGER NOT NULL DEFAULT 0,
    finalized INTEGER NOT NULL DEFAULT 0,
    CHECK (NOT (preference_window_open = 1 AND finalized = 1))
);

CREATE TABLE IF NOT EXISTS seat_offering (
    subject_id TEXT NOT NULL REFERENCES subject(subject_id) ON DELETE CASCADE,
    target_id TEXT NOT NULL,
    target_kind TEXT NOT NULL CHECK (target_kind IN ('COURSE', 'BUCKET')),
    target_name TEXT NOT NULL,
    total_seats INTEGER NOT NULL CHECK (total_seats >= 0),
    available_seats INTEGER NOT NULL,
    PRIMARY KEY (subject_id, target_id),
    CHECK (available_seats >= 0 AND available_seats <= total_seats)
);

CREATE TABLE IF NOT EXISTS student (
    student_id TEXT PRIMARY KEY,
    registration_no TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    program_id TEXT NOT NULL,
    prior_section_id TEXT,
    run_allotment INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS preference (
    subject_id TEXT NOT NULL REFERENCES subject(subject_id) ON DELETE CASCADE,
    student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
    choices_json TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    PRIMARY KEY (subject_id, student_id)
);

CREATE TABLE IF NOT EXISTS section (
    section_id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    name TEXT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity > 0),
    UNIQUE (subject_id, target_id, name),
    FOREIGN KEY (subject_id, target_id)
        REFERENCES seat_offering(subject_id, target_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS section_member (
    subject_id TEXT NOT NULL,
    student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
    section_id TEXT NOT NULL REFERENCES section(section_id) ON DELETE CASCADE,
    PRIMARY KEY (subject_id, student_id)
);

CREATE INDEX IF NOT EXISTS idx_section_member_section ON section_member(section_id);

CREATE TABLE IF NOT EXISTS allotment_run (
    run_id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    status TEXT NOT NULL,
    triggered_by TEXT NOT NULL,
    allotted_count INTEGER NOT NULL DEFAULT 0,
    unallotted_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    summary_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_allotment_run_subject ON allotment_run(subject_id, started_at);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_subject_flags_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO subject (subject_id, name, batch_id, allotment_type, preference_window_open, finalized)
             VALUES ('S1', 'x', 'B', 'STANDALONE', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
