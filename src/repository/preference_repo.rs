// ==========================================
// 选修课分配系统 - 志愿仓储
// ==========================================
// 红线: Repository 不做校验，只做数据映射
// 提交语义: 先删后插（单事务），最后一次提交生效
// ==========================================

use crate::domain::preference::{Preference, PreferenceChoices};
use crate::domain::student::Candidate;
use crate::domain::subject::Subject;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::student_repo::map_student_row;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct PreferenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PreferenceRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 替换学生志愿（删除旧记录后插入新记录）
    pub fn replace(&self, preference: &Preference) -> RepositoryResult<()> {
        let choices_json = serde_json::to_string(&preference.choices)
            .map_err(|e| RepositoryError::InternalError(e.to_string()))?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM preference WHERE subject_id = ?1 AND student_id = ?2",
            params![preference.subject_id, preference.student_id],
        )?;
        tx.execute(
            r#"
            INSERT INTO preference (subject_id, student_id, choices_json, submitted_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                preference.subject_id,
                preference.student_id,
                choices_json,
                preference.submitted_at.format(TS_FORMAT).to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn find(&self, subject_id: &str, student_id: &str) -> RepositoryResult<Option<Preference>> {
        let conn = self.get_conn()?;
        let preference = conn
            .query_row(
                r#"
                SELECT subject_id, student_id, choices_json, submitted_at
                FROM preference
                WHERE subject_id = ?1 AND student_id = ?2
                "#,
                params![subject_id, student_id],
                map_preference_row,
            )
            .optional()?;
        Ok(preference)
    }

    pub fn list_by_subject(&self, subject_id: &str) -> RepositoryResult<Vec<Preference>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT subject_id, student_id, choices_json, submitted_at
            FROM preference
            WHERE subject_id = ?1
            ORDER BY student_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![subject_id], map_preference_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 查询参加分配的学生及其志愿
    ///
    /// 条件: run_allotment = 1，批次与专业匹配，且已提交志愿
    /// 顺序: prior_section_id（空值在后），再按发现顺序
    pub fn find_candidates(&self, subject: &Subject) -> RepositoryResult<Vec<Candidate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT s.student_id, s.registration_no, s.name, s.batch_id, s.program_id,
                   s.prior_section_id, s.run_allotment, p.choices_json
            FROM preference p
            JOIN student s ON s.student_id = p.student_id
            WHERE p.subject_id = ?1
              AND s.run_allotment = 1
              AND s.batch_id = ?2
            ORDER BY s.prior_section_id IS NULL, s.prior_section_id, s.rowid
            "#,
        )?;

        let rows = stmt
            .query_map(params![subject.subject_id, subject.batch_id], |row| {
                let student = map_student_row(row)?;
                let choices = parse_choices(row, 7)?;
                Ok(Candidate { student, choices })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter(|c| subject.admits(&c.student.batch_id, &c.student.program_id))
            .collect())
    }
}

fn parse_choices(row: &Row<'_>, idx: usize) -> rusqlite::Result<PreferenceChoices> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_preference_row(row: &Row<'_>) -> rusqlite::Result<Preference> {
    let raw_ts: String = row.get(3)?;
    let submitted_at = NaiveDateTime::parse_from_str(&raw_ts, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Preference {
        subject_id: row.get(0)?,
        student_id: row.get(1)?,
        choices: parse_choices(row, 2)?,
        submitted_at,
    })
}
