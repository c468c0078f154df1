// ==========================================
// 选修课分配系统 - 分配运行记录仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// ==========================================

use crate::domain::allotment_run::AllotmentRun;
use crate::domain::types::RunStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct AllotmentRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllotmentRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入运行记录
    pub fn insert(&self, run: &AllotmentRun) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO allotment_run (
                run_id, subject_id, status, triggered_by, allotted_count,
                unallotted_count, started_at, finished_at, summary_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                run.run_id,
                run.subject_id,
                run.status.to_db_str(),
                run.triggered_by,
                run.allotted_count,
                run.unallotted_count,
                run.started_at.format(TS_FORMAT).to_string(),
                run.finished_at.map(|t| t.format(TS_FORMAT).to_string()),
                run.summary_json.as_ref().map(|v| v.to_string()),
                run.detail,
            ],
        )?;
        Ok(run.run_id.clone())
    }

    /// 结束运行（写入终态与统计）
    pub fn finish(&self, run: &AllotmentRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE allotment_run
            SET status = ?2, allotted_count = ?3, unallotted_count = ?4,
                finished_at = ?5, summary_json = ?6, detail = ?7
            WHERE run_id = ?1
            "#,
            params![
                run.run_id,
                run.status.to_db_str(),
                run.allotted_count,
                run.unallotted_count,
                run.finished_at.map(|t| t.format(TS_FORMAT).to_string()),
                run.summary_json.as_ref().map(|v| v.to_string()),
                run.detail,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "AllotmentRun".to_string(),
                id: run.run_id.clone(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<AllotmentRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!("{} WHERE run_id = ?1", SELECT_RUN),
                params![run_id],
                map_run_row,
            )
            .optional()?;
        Ok(run)
    }

    /// 最近的运行记录（新在前）
    pub fn list_by_subject(&self, subject_id: &str, limit: usize) -> RepositoryResult<Vec<AllotmentRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE subject_id = ?1 ORDER BY started_at DESC, rowid DESC LIMIT ?2",
            SELECT_RUN
        ))?;
        let runs = stmt
            .query_map(params![subject_id, limit as i64], map_run_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// 最近一次成功运行
    pub fn latest_completed(&self, subject_id: &str) -> RepositoryResult<Option<AllotmentRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!(
                    "{} WHERE subject_id = ?1 AND status = ?2 ORDER BY started_at DESC, rowid DESC LIMIT 1",
                    SELECT_RUN
                ),
                params![subject_id, RunStatus::Completed.to_db_str()],
                map_run_row,
            )
            .optional()?;
        Ok(run)
    }
}

const SELECT_RUN: &str = r#"
    SELECT run_id, subject_id, status, triggered_by, allotted_count,
           unallotted_count, started_at, finished_at, summary_json, detail
    FROM allotment_run"#;

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<AllotmentRun> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;
    let summary_json: Option<String> = row.get(8)?;

    Ok(AllotmentRun {
        run_id: row.get(0)?,
        subject_id: row.get(1)?,
        status: RunStatus::from_str(&status),
        triggered_by: row.get(3)?,
        allotted_count: row.get(4)?,
        unallotted_count: row.get(5)?,
        started_at: parse_ts(6, &started_at)?,
        finished_at: finished_at.as_deref().map(|s| parse_ts(7, s)).transpose()?,
        summary_json: summary_json.and_then(|s| serde_json::from_str::<JsonValue>(&s).ok()),
        detail: row.get(9)?,
    })
}
