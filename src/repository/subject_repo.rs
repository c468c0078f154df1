// ==========================================
// 选修课分配系统 - 选课轮次仓储
// ==========================================
// 红线: 任何写入都不得同时置位 preference_window_open 与 finalized
// ==========================================

use crate::domain::section::check_id_part;
use crate::domain::subject::Subject;
use crate::domain::types::AllotmentType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// SubjectRepository - 选课轮次仓储
// ==========================================
pub struct SubjectRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SubjectRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新选课轮次
    ///
    /// # 返回
    /// - Err(ValidationError): 标志互斥校验失败，或 subject_id 含 section_id 分隔符
    pub fn upsert(&self, subject: &Subject) -> RepositoryResult<()> {
        subject.check_flags().map_err(RepositoryError::ValidationError)?;
        check_id_part("subject_id", &subject.subject_id).map_err(RepositoryError::ValidationError)?;

        let program_ids_json = serde_json::to_string(&subject.program_ids)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO subject (
                subject_id, name, batch_id, program_ids_json, allotment_type,
                preference_window_open, finalized
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(subject_id) DO UPDATE SET
                name = excluded.name,
                batch_id = excluded.batch_id,
                program_ids_json = excluded.program_ids_json,
                allotment_type = excluded.allotment_type,
                preference_window_open = excluded.preference_window_open,
                finalized = excluded.finalized
            "#,
            params![
                subject.subject_id,
                subject.name,
                subject.batch_id,
                program_ids_json,
                subject.allotment_type.to_db_str(),
                subject.preference_window_open,
                subject.finalized,
            ],
        )?;
        Ok(())
    }

    /// 按ID查询
    pub fn find_by_id(&self, subject_id: &str) -> RepositoryResult<Option<Subject>> {
        let conn = self.get_conn()?;
        let subject = conn
            .query_row(
                r#"
                SELECT subject_id, name, batch_id, program_ids_json, allotment_type,
                       preference_window_open, finalized
                FROM subject
                WHERE subject_id = ?1
                "#,
                params![subject_id],
                map_subject_row,
            )
            .optional()?;
        Ok(subject)
    }

    /// 按ID查询，不存在时返回 NotFound
    pub fn get(&self, subject_id: &str) -> RepositoryResult<Subject> {
        self.find_by_id(subject_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Subject".to_string(),
            id: subject_id.to_string(),
        })
    }

    /// 开放/关闭志愿填报窗口
    ///
    /// 开放窗口会同时撤销定稿（互斥约束）
    pub fn set_preference_window(&self, subject_id: &str, open: bool) -> RepositoryResult<Subject> {
        {
            let conn = self.get_conn()?;
            let affected = if open {
                conn.execute(
                    "UPDATE subject SET preference_window_open = 1, finalized = 0 WHERE subject_id = ?1",
                    params![subject_id],
                )?
            } else {
                conn.execute(
                    "UPDATE subject SET preference_window_open = 0 WHERE subject_id = ?1",
                    params![subject_id],
                )?
            };
            if affected == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "Subject".to_string(),
                    id: subject_id.to_string(),
                });
            }
        }
        self.get(subject_id)
    }

    /// 定稿/撤销定稿
    ///
    /// # 返回
    /// - Err(InvalidStateTransition): 志愿窗口仍开放时不可定稿
    pub fn set_finalized(&self, subject_id: &str, finalized: bool) -> RepositoryResult<Subject> {
        let current = self.get(subject_id)?;
        if finalized && current.preference_window_open {
            return Err(RepositoryError::InvalidStateTransition {
                from: "PREFERENCE_WINDOW_OPEN".to_string(),
                to: "FINALIZED".to_string(),
            });
        }

        {
            let conn = self.get_conn()?;
            conn.execute(
                "UPDATE subject SET finalized = ?2 WHERE subject_id = ?1 AND preference_window_open = 0",
                params![subject_id, finalized],
            )?;
        }
        self.get(subject_id)
    }
}

fn map_subject_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    let program_ids_json: String = row.get(3)?;
    let program_ids: Vec<String> = serde_json::from_str(&program_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let raw_type: String = row.get(4)?;
    let allotment_type = AllotmentType::from_db_str(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("未知分配模式: {}", raw_type).into(),
        )
    })?;

    Ok(Subject {
        subject_id: row.get(0)?,
        name: row.get(1)?,
        batch_id: row.get(2)?,
        program_ids,
        allotment_type,
        preference_window_open: row.get(5)?,
        finalized: row.get(6)?,
    })
}
