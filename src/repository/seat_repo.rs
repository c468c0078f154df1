// ==========================================
// 选修课分配系统 - 座位台账仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 扣减不得使 available_seats < 0
// ==========================================

use crate::domain::seat::SeatOffering;
use crate::domain::section::check_id_part;
use crate::domain::types::TargetKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// SeatOfferingRepository - 座位台账仓储
// ==========================================

/// 座位台账仓储
/// 职责: 管理 seat_offering 表的读写、重置与扣减
pub struct SeatOfferingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SeatOfferingRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新座位供给（外部配置入口）
    ///
    /// 已有记录原地更新，已占用座位数保持不变：
    /// available_seats = 新 total_seats - 已占用（忽略传入的 available_seats）
    ///
    /// # 返回
    /// - Err(ValidationError): ID 非法、available_seats > total_seats，
    ///   或新 total_seats 小于已占用座位
    pub fn upsert(&self, offering: &SeatOffering) -> RepositoryResult<()> {
        check_id_part("subject_id", &offering.subject_id).map_err(RepositoryError::ValidationError)?;
        check_id_part("target_id", &offering.target_id).map_err(RepositoryError::ValidationError)?;
        if offering.available_seats > offering.total_seats {
            return Err(RepositoryError::ValidationError(format!(
                "剩余座位({})不能超过总座位({}): target={}",
                offering.available_seats, offering.total_seats, offering.target_id
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let occupied: Option<u32> = tx
            .query_row(
                r#"
                SELECT total_seats - available_seats
                FROM seat_offering
                WHERE subject_id = ?1 AND target_id = ?2
                "#,
                params![offering.subject_id, offering.target_id],
                |row| row.get(0),
            )
            .optional()?;

        let available_seats = match occupied {
            Some(occupied) if offering.total_seats < occupied => {
                return Err(RepositoryError::ValidationError(format!(
                    "总座位({})不能少于已占用座位({}): target={}",
                    offering.total_seats, occupied, offering.target_id
                )));
            }
            Some(occupied) => offering.total_seats - occupied,
            None => offering.available_seats,
        };

        // ON CONFLICT 原地更新，避免 REPLACE 删除旧行触发教学班级联删除
        tx.execute(
            r#"
            INSERT INTO seat_offering (
                subject_id, target_id, target_kind, target_name,
                total_seats, available_seats
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(subject_id, target_id) DO UPDATE SET
                target_kind = excluded.target_kind,
                target_name = excluded.target_name,
                total_seats = excluded.total_seats,
                available_seats = excluded.available_seats
            "#,
            params![
                offering.subject_id,
                offering.target_id,
                offering.target_kind.to_db_str(),
                offering.target_name,
                offering.total_seats,
                available_seats,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// 查询选课轮次的全部座位供给（按 target_id 排序）
    pub fn find_by_subject(&self, subject_id: &str) -> RepositoryResult<Vec<SeatOffering>> {
        let conn = self.get_conn()?;
        find_by_subject_in(&conn, subject_id)
    }

    /// 查询单个座位供给
    pub fn find(&self, subject_id: &str, target_id: &str) -> RepositoryResult<Option<SeatOffering>> {
        let conn = self.get_conn()?;
        let offering = conn
            .query_row(
                r#"
                SELECT subject_id, target_id, target_kind, target_name,
                       total_seats, available_seats
                FROM seat_offering
                WHERE subject_id = ?1 AND target_id = ?2
                "#,
                params![subject_id, target_id],
                map_offering_row,
            )
            .optional()?;
        Ok(offering)
    }

    /// 重置：available_seats = total_seats
    ///
    /// # 返回
    /// - Ok(usize): 重置的座位供给条数
    pub fn reset(&self, subject_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        reset_in(&conn, subject_id)
    }

    /// 扣减 n 个座位
    ///
    /// # 返回
    /// - Err(NotFound): 座位供给不存在
    /// - Err(CapacityExceeded): 剩余座位不足
    pub fn decrement(&self, subject_id: &str, target_id: &str, n: u32) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        decrement_in(&conn, subject_id, target_id, n)
    }
}

// ==========================================
// 事务内操作（供分配落库复用）
// ==========================================

pub(crate) fn find_by_subject_in(conn: &Connection, subject_id: &str) -> RepositoryResult<Vec<SeatOffering>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT subject_id, target_id, target_kind, target_name,
               total_seats, available_seats
        FROM seat_offering
        WHERE subject_id = ?1
        ORDER BY target_id
        "#,
    )?;

    let offerings = stmt
        .query_map(params![subject_id], map_offering_row)?
        .collect::<SqliteResult<Vec<SeatOffering>>>()?;
    Ok(offerings)
}

pub(crate) fn reset_in(conn: &Connection, subject_id: &str) -> RepositoryResult<usize> {
    let affected = conn.execute(
        "UPDATE seat_offering SET available_seats = total_seats WHERE subject_id = ?1",
        params![subject_id],
    )?;
    Ok(affected)
}

pub(crate) fn decrement_in(
    conn: &Connection,
    subject_id: &str,
    target_id: &str,
    n: u32,
) -> RepositoryResult<()> {
    if n == 0 {
        return Ok(());
    }

    let available: Option<u32> = conn
        .query_row(
            "SELECT available_seats FROM seat_offering WHERE subject_id = ?1 AND target_id = ?2",
            params![subject_id, target_id],
            |row| row.get(0),
        )
        .optional()?;

    let available = available.ok_or_else(|| RepositoryError::NotFound {
        entity: "SeatOffering".to_string(),
        id: format!("{}/{}", subject_id, target_id),
    })?;

    let affected = conn.execute(
        r#"
        UPDATE seat_offering
        SET available_seats = available_seats - ?3
        WHERE subject_id = ?1 AND target_id = ?2 AND available_seats >= ?3
        "#,
        params![subject_id, target_id, n],
    )?;

    if affected == 0 {
        return Err(RepositoryError::CapacityExceeded {
            subject_id: subject_id.to_string(),
            target_id: target_id.to_string(),
            requested: n,
            available,
        });
    }
    Ok(())
}

fn map_offering_row(row: &Row<'_>) -> SqliteResult<SeatOffering> {
    let raw_kind: String = row.get(2)?;
    let target_kind = TargetKind::from_db_str(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("未知目标类型: {}", raw_kind).into(),
        )
    })?;

    Ok(SeatOffering {
        subject_id: row.get(0)?,
        target_id: row.get(1)?,
        target_kind,
        target_name: row.get(3)?,
        total_seats: row.get(4)?,
        available_seats: row.get(5)?,
    })
}
