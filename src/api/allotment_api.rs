// ==========================================
// 选修课分配系统 - 分配 API
// ==========================================
// 职责: 触发分配、查询结果、座位汇总、选课轮次生命周期
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::allotment_run::AllotmentRun;
use crate::domain::section::AllotmentRecord;
use crate::domain::student::Student;
use crate::domain::subject::Subject;
use crate::domain::types::TargetKind;
use crate::engine::{AllotmentMaterializer, AllotmentReport, AllotmentRepositories};

/// 座位目标汇总（用于管理端展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSummary {
    pub target_id: String,
    pub target_kind: TargetKind,
    pub target_name: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub allotted: u32,
    pub section_count: usize,
}

/// 分配API
pub struct AllotmentApi {
    repos: AllotmentRepositories,
    materializer: AllotmentMaterializer<AllotmentRepositories>,
    config_manager: Arc<ConfigManager>,
}

impl AllotmentApi {
    pub fn new(
        repos: AllotmentRepositories,
        materializer: AllotmentMaterializer<AllotmentRepositories>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            repos,
            materializer,
            config_manager,
        }
    }

    // ==========================================
    // 分配
    // ==========================================

    /// 执行一次完整分配（同步，调用方负责放到阻塞线程）
    #[instrument(skip(self, cancel))]
    pub fn run_allotment(
        &self,
        subject_id: &str,
        triggered_by: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<AllotmentReport> {
        let config = self
            .config_manager
            .load_allotment_config()
            .map_err(|e| ApiError::InternalError(format!("读取分配配置失败: {}", e)))?;

        Ok(self
            .materializer
            .run_allotment(subject_id, triggered_by, &config, cancel)?)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询分配结果，可按学生过滤
    pub fn get_allotments(
        &self,
        subject_id: &str,
        student_id: Option<&str>,
    ) -> ApiResult<Vec<AllotmentRecord>> {
        self.repos.subject_repo.get(subject_id)?;
        Ok(self.repos.section_repo.find_allotments(subject_id, student_id)?)
    }

    /// 参加分配但没有教学班的学生
    pub fn list_unallotted(&self, subject_id: &str) -> ApiResult<Vec<Student>> {
        let subject = self.repos.subject_repo.get(subject_id)?;
        let allotted: HashSet<String> = self
            .repos
            .section_repo
            .find_allotments(subject_id, None)?
            .into_iter()
            .map(|r| r.student_id)
            .collect();

        Ok(self
            .repos
            .preference_repo
            .find_candidates(&subject)?
            .into_iter()
            .map(|c| c.student)
            .filter(|s| !allotted.contains(&s.student_id))
            .collect())
    }

    pub fn seat_summary(&self, subject_id: &str) -> ApiResult<Vec<SeatSummary>> {
        self.repos.subject_repo.get(subject_id)?;
        let counts = self.repos.section_repo.count_members_by_target(subject_id)?;
        let sections = self.repos.section_repo.find_by_subject(subject_id)?;

        Ok(self
            .repos
            .seat_repo
            .find_by_subject(subject_id)?
            .into_iter()
            .map(|o| SeatSummary {
                allotted: counts.get(&o.target_id).copied().unwrap_or(0),
                section_count: sections.iter().filter(|s| s.target_id == o.target_id).count(),
                target_id: o.target_id,
                target_kind: o.target_kind,
                target_name: o.target_name,
                total_seats: o.total_seats,
                available_seats: o.available_seats,
            })
            .collect())
    }

    pub fn list_runs(&self, subject_id: &str, limit: usize) -> ApiResult<Vec<AllotmentRun>> {
        Ok(self.repos.run_repo.list_by_subject(subject_id, limit)?)
    }

    // ==========================================
    // 选课轮次生命周期
    // ==========================================

    /// 开放志愿窗口（同时撤销定稿）
    pub fn open_preference_window(&self, subject_id: &str) -> ApiResult<Subject> {
        self.ensure_idle(subject_id)?;
        let subject = self.repos.subject_repo.set_preference_window(subject_id, true)?;
        info!(subject_id, "志愿窗口已开放");
        Ok(subject)
    }

    pub fn close_preference_window(&self, subject_id: &str) -> ApiResult<Subject> {
        let subject = self.repos.subject_repo.set_preference_window(subject_id, false)?;
        info!(subject_id, "志愿窗口已关闭");
        Ok(subject)
    }

    /// 定稿
    ///
    /// # 返回
    /// - Err(InvalidStateTransition): 志愿窗口开放中，或尚无成功的分配
    pub fn finalize(&self, subject_id: &str) -> ApiResult<Subject> {
        self.ensure_idle(subject_id)?;
        let subject = self.repos.subject_repo.get(subject_id)?;
        if subject.preference_window_open {
            return Err(ApiError::InvalidStateTransition {
                from: "PREFERENCE_WINDOW_OPEN".to_string(),
                to: "FINALIZED".to_string(),
            });
        }
        if self.repos.run_repo.latest_completed(subject_id)?.is_none() {
            return Err(ApiError::InvalidStateTransition {
                from: "NOT_ALLOTTED".to_string(),
                to: "FINALIZED".to_string(),
            });
        }

        let subject = self.repos.subject_repo.set_finalized(subject_id, true)?;
        info!(subject_id, "分配结果已定稿");
        Ok(subject)
    }

    pub fn unfinalize(&self, subject_id: &str) -> ApiResult<Subject> {
        let subject = self.repos.subject_repo.set_finalized(subject_id, false)?;
        info!(subject_id, "已撤销定稿");
        Ok(subject)
    }

    fn ensure_idle(&self, subject_id: &str) -> ApiResult<()> {
        if self.materializer.is_running(subject_id) {
            return Err(ApiError::AllotmentInProgress(subject_id.to_string()));
        }
        Ok(())
    }
}
