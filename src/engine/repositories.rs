// ==========================================
// 选修课分配系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合分配落库所需的所有 Repository
// 接缝: AllotmentStore trait，测试时可替换为内存实现
// ==========================================

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::allotment_run::AllotmentRun;
use crate::domain::seat::SeatOffering;
use crate::domain::section::Section;
use crate::domain::student::Candidate;
use crate::domain::subject::Subject;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{
    seat_repo, section_repo, AllotmentRunRepository, PreferenceRepository, SeatOfferingRepository,
    SectionRepository, StudentRepository, SubjectRepository,
};

// ==========================================
// 落库计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    pub student_id: String,
    pub section_id: String,
    pub target_id: String,
}

/// 一次分配需要写入的全部内容
#[derive(Debug, Clone)]
pub struct MaterializationPlan {
    pub subject_id: String,
    pub sections: Vec<Section>,
    pub members: Vec<MemberRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// 已提交
    Committed { sections: usize, members: usize },
    /// 已回滚，数据库保持运行前状态
    Cancelled { chunks_written: usize },
}

// ==========================================
// AllotmentStore Trait
// ==========================================
// 实现者: AllotmentRepositories（使用 rusqlite）
pub trait AllotmentStore: Send + Sync {
    fn load_subject(&self, subject_id: &str) -> RepositoryResult<Subject>;

    fn load_offerings(&self, subject_id: &str) -> RepositoryResult<Vec<SeatOffering>>;

    fn load_candidates(&self, subject: &Subject) -> RepositoryResult<Vec<Candidate>>;

    fn begin_run(&self, run: &AllotmentRun) -> RepositoryResult<()>;

    fn finish_run(&self, run: &AllotmentRun) -> RepositoryResult<()>;

    /// 用新计划整体替换选课轮次的分配结果
    ///
    /// 顺序: 删除旧分班 → 重置剩余座位 → 写入新分班 → 分片写入成员并扣减座位
    ///
    /// # 返回
    /// - Ok(Committed): 全部写入并提交
    /// - Ok(Cancelled): 分片间检测到取消，事务回滚
    /// - Err: 任一步失败，事务回滚
    fn replace_allotment(
        &self,
        plan: &MaterializationPlan,
        chunk_size: usize,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ReplaceOutcome>;
}

/// 分配仓储集合
///
/// 所有仓储共享同一个连接，落库在该连接上开启单一事务
#[derive(Clone)]
pub struct AllotmentRepositories {
    conn: Arc<Mutex<Connection>>,
    pub subject_repo: Arc<SubjectRepository>,
    pub seat_repo: Arc<SeatOfferingRepository>,
    pub student_repo: Arc<StudentRepository>,
    pub preference_repo: Arc<PreferenceRepository>,
    pub section_repo: Arc<SectionRepository>,
    pub run_repo: Arc<AllotmentRunRepository>,
}

impl AllotmentRepositories {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            subject_repo: Arc::new(SubjectRepository::new(conn.clone())),
            seat_repo: Arc::new(SeatOfferingRepository::new(conn.clone())),
            student_repo: Arc::new(StudentRepository::new(conn.clone())),
            preference_repo: Arc::new(PreferenceRepository::new(conn.clone())),
            section_repo: Arc::new(SectionRepository::new(conn.clone())),
            run_repo: Arc::new(AllotmentRunRepository::new(conn.clone())),
            conn,
        }
    }
}

impl AllotmentStore for AllotmentRepositories {
    fn load_subject(&self, subject_id: &str) -> RepositoryResult<Subject> {
        self.subject_repo.get(subject_id)
    }

    fn load_offerings(&self, subject_id: &str) -> RepositoryResult<Vec<SeatOffering>> {
        self.seat_repo.find_by_subject(subject_id)
    }

    fn load_candidates(&self, subject: &Subject) -> RepositoryResult<Vec<Candidate>> {
        self.preference_repo.find_candidates(subject)
    }

    fn begin_run(&self, run: &AllotmentRun) -> RepositoryResult<()> {
        self.run_repo.insert(run).map(|_| ())
    }

    fn finish_run(&self, run: &AllotmentRun) -> RepositoryResult<()> {
        self.run_repo.finish(run)
    }

    fn replace_allotment(
        &self,
        plan: &MaterializationPlan,
        chunk_size: usize,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ReplaceOutcome> {
        if chunk_size == 0 {
            return Err(RepositoryError::ValidationError("分片大小必须大于 0".to_string()));
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction()?;

        let removed = section_repo::delete_by_subject_in(&tx, &plan.subject_id)?;
        seat_repo::reset_in(&tx, &plan.subject_id)?;
        section_repo::insert_sections_in(&tx, &plan.sections)?;
        debug!(subject_id = %plan.subject_id, removed, created = plan.sections.len(), "分班已重建");

        let mut chunks_written = 0;
        for chunk in plan.members.chunks(chunk_size) {
            if cancel.is_cancelled() {
                warn!(subject_id = %plan.subject_id, chunks_written, "落库已取消，回滚");
                // tx 析构时回滚
                return Ok(ReplaceOutcome::Cancelled { chunks_written });
            }

            let pairs: Vec<(String, String)> = chunk
                .iter()
                .map(|m| (m.student_id.clone(), m.section_id.clone()))
                .collect();
            section_repo::insert_members_in(&tx, &plan.subject_id, &pairs)?;

            let mut per_target: BTreeMap<&str, u32> = BTreeMap::new();
            for m in chunk {
                *per_target.entry(m.target_id.as_str()).or_insert(0) += 1;
            }
            for (target_id, n) in per_target {
                seat_repo::decrement_in(&tx, &plan.subject_id, target_id, n)?;
            }

            chunks_written += 1;
        }

        if cancel.is_cancelled() {
            warn!(subject_id = %plan.subject_id, chunks_written, "提交前取消，回滚");
            return Ok(ReplaceOutcome::Cancelled { chunks_written });
        }

        tx.commit()?;
        Ok(ReplaceOutcome::Committed {
            sections: plan.sections.len(),
            members: plan.members.len(),
        })
    }
}
