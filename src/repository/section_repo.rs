// ==========================================
// 选修课分配系统 - 分班仓储
// ==========================================
// 红线: 分班结果只由分配落库流程写入
// 写入函数 *_in 接收调用方事务，读取函数走共享连接
// ==========================================

use crate::domain::section::{AllotmentRecord, Section};
use crate::domain::types::TargetKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct SectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SectionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询选课轮次的全部教学班（含当前人数）
    pub fn find_by_subject(&self, subject_id: &str) -> RepositoryResult<Vec<Section>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sec.section_id, sec.subject_id, sec.target_id, sec.name, sec.capacity,
                   COUNT(m.student_id) AS member_count
            FROM section sec
            LEFT JOIN section_member m ON m.section_id = sec.section_id
            WHERE sec.subject_id = ?1
            GROUP BY sec.section_id
            ORDER BY sec.target_id, LENGTH(sec.name), sec.name
            "#,
        )?;
        let sections = stmt
            .query_map(params![subject_id], |row| {
                Ok(Section {
                    section_id: row.get(0)?,
                    subject_id: row.get(1)?,
                    target_id: row.get(2)?,
                    name: row.get(3)?,
                    capacity: row.get(4)?,
                    member_count: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sections)
    }

    /// 查询分配结果（可按学生过滤）
    pub fn find_allotments(
        &self,
        subject_id: &str,
        student_id: Option<&str>,
    ) -> RepositoryResult<Vec<AllotmentRecord>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(
            r#"
            SELECT m.subject_id, st.student_id, st.registration_no, st.name,
                   sec.target_id, o.target_kind, o.target_name,
                   sec.section_id, sec.name
            FROM section_member m
            JOIN section sec ON sec.section_id = m.section_id
            JOIN student st ON st.student_id = m.student_id
            JOIN seat_offering o ON o.subject_id = sec.subject_id AND o.target_id = sec.target_id
            WHERE m.subject_id = ?1
            "#,
        );
        let mut values: Vec<Value> = vec![Value::from(subject_id.to_string())];

        if let Some(id) = student_id.map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(" AND m.student_id = ?2");
            values.push(Value::from(id.to_string()));
        }
        sql.push_str(" ORDER BY sec.target_id, LENGTH(sec.name), sec.name, st.registration_no");

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), map_allotment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// 各目标已分配人数
    pub fn count_members_by_target(&self, subject_id: &str) -> RepositoryResult<HashMap<String, u32>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sec.target_id, COUNT(*)
            FROM section_member m
            JOIN section sec ON sec.section_id = m.section_id
            WHERE m.subject_id = ?1
            GROUP BY sec.target_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![subject_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }
}

// ==========================================
// 事务内写入
// ==========================================

/// 删除选课轮次的全部分班及成员
///
/// # 返回
/// - Ok(usize): 删除的教学班数量
pub(crate) fn delete_by_subject_in(conn: &Connection, subject_id: &str) -> RepositoryResult<usize> {
    conn.execute(
        "DELETE FROM section_member WHERE subject_id = ?1",
        params![subject_id],
    )?;
    let removed = conn.execute("DELETE FROM section WHERE subject_id = ?1", params![subject_id])?;
    Ok(removed)
}

pub(crate) fn insert_sections_in(conn: &Connection, sections: &[Section]) -> RepositoryResult<usize> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO section (section_id, subject_id, target_id, name, capacity)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;
    for s in sections {
        stmt.execute(params![s.section_id, s.subject_id, s.target_id, s.name, s.capacity])?;
    }
    Ok(sections.len())
}

/// 写入成员关系 (student_id, section_id)
pub(crate) fn insert_members_in(
    conn: &Connection,
    subject_id: &str,
    members: &[(String, String)],
) -> RepositoryResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO section_member (subject_id, student_id, section_id) VALUES (?1, ?2, ?3)",
    )?;
    for (student_id, section_id) in members {
        stmt.execute(params![subject_id, student_id, section_id])?;
    }
    Ok(members.len())
}

fn map_allotment_row(row: &Row<'_>) -> rusqlite::Result<AllotmentRecord> {
    let raw_kind: String = row.get(5)?;
    let target_kind = TargetKind::from_db_str(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, format!("未知目标类型: {}", raw_kind).into())
    })?;

    Ok(AllotmentRecord {
        subject_id: row.get(0)?,
        student_id: row.get(1)?,
        registration_no: row.get(2)?,
        student_name: row.get(3)?,
        target_id: row.get(4)?,
        target_kind,
        target_name: row.get(6)?,
        section_id: row.get(7)?,
        section_name: row.get(8)?,
    })
}
