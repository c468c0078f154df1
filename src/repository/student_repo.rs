// ==========================================
// 选修课分配系统 - 学生仓储
// ==========================================
// 学生主数据由外部系统同步写入，分配流程只读
// ==========================================

use crate::domain::student::Student;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct StudentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StudentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入或更新学生（单事务）
    pub fn batch_upsert(&self, students: &[Student]) -> RepositoryResult<usize> {
        if students.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO student (
                    student_id, registration_no, name, batch_id, program_id,
                    prior_section_id, run_allotment
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(student_id) DO UPDATE SET
                    registration_no = excluded.registration_no,
                    name = excluded.name,
                    batch_id = excluded.batch_id,
                    program_id = excluded.program_id,
                    prior_section_id = excluded.prior_section_id,
                    run_allotment = excluded.run_allotment
                "#,
            )?;

            for s in students {
                stmt.execute(params![
                    s.student_id,
                    s.registration_no,
                    s.name,
                    s.batch_id,
                    s.program_id,
                    s.prior_section_id,
                    s.run_allotment,
                ])?;
            }
        }
        tx.commit()?;
        Ok(students.len())
    }

    pub fn upsert(&self, student: &Student) -> RepositoryResult<()> {
        self.batch_upsert(std::slice::from_ref(student)).map(|_| ())
    }

    pub fn find_by_id(&self, student_id: &str) -> RepositoryResult<Option<Student>> {
        let conn = self.get_conn()?;
        let student = conn
            .query_row(
                r#"
                SELECT student_id, registration_no, name, batch_id, program_id,
                       prior_section_id, run_allotment
                FROM student
                WHERE student_id = ?1
                "#,
                params![student_id],
                map_student_row,
            )
            .optional()?;
        Ok(student)
    }

    /// 设置是否参加分配
    pub fn set_run_allotment(&self, student_id: &str, run_allotment: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE student SET run_allotment = ?2 WHERE student_id = ?1",
            params![student_id, run_allotment],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Student".to_string(),
                id: student_id.to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn map_student_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: row.get(0)?,
        registration_no: row.get(1)?,
        name: row.get(2)?,
        batch_id: row.get(3)?,
        program_id: row.get(4)?,
        prior_section_id: row.get(5)?,
        run_allotment: row.get(6)?,
    })
}
