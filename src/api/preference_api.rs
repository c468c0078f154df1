// ==========================================
// 选修课分配系统 - 志愿 API
// ==========================================
// 职责: 志愿提交（校验 + 整体替换）、志愿查询
// 红线: 校验失败不改动任何数据
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::preference::{Preference, PreferenceChoices, MAX_CHOICES, MIN_CHOICES};
use crate::repository::{
    PreferenceRepository, SeatOfferingRepository, StudentRepository, SubjectRepository,
};

/// 志愿API
pub struct PreferenceApi {
    subject_repo: Arc<SubjectRepository>,
    student_repo: Arc<StudentRepository>,
    seat_repo: Arc<SeatOfferingRepository>,
    preference_repo: Arc<PreferenceRepository>,
}

impl PreferenceApi {
    pub fn new(
        subject_repo: Arc<SubjectRepository>,
        student_repo: Arc<StudentRepository>,
        seat_repo: Arc<SeatOfferingRepository>,
        preference_repo: Arc<PreferenceRepository>,
    ) -> Self {
        Self {
            subject_repo,
            student_repo,
            seat_repo,
            preference_repo,
        }
    }

    /// 提交志愿（覆盖该学生在本轮次的已有志愿）
    ///
    /// # 校验
    /// 1. 选课轮次存在且志愿窗口开放
    /// 2. 志愿数 2~3 个，去空格后非空且不重复
    /// 3. 学生存在，批次与专业属于该轮次
    /// 4. 每个志愿都是该轮次的座位目标，且类型与分配模式一致
    ///
    /// # 返回
    /// - Ok(Preference): 已保存的志愿
    /// - Err(ApiError::ValidationError / NotFound): 未做任何修改
    pub fn submit_preferences(
        &self,
        subject_id: &str,
        student_id: &str,
        ordered_target_ids: Vec<String>,
    ) -> ApiResult<Preference> {
        let subject = self.subject_repo.find_by_id(subject_id)?.ok_or_else(|| {
            ApiError::ValidationError(format!("选课轮次不存在: {}", subject_id))
        })?;
        if !subject.preference_window_open {
            return Err(ApiError::ValidationError(format!(
                "选课轮次 {} 的志愿窗口未开放",
                subject_id
            )));
        }

        let targets: Vec<String> = ordered_target_ids
            .into_iter()
            .map(|t| t.trim().to_string())
            .collect();
        if targets.iter().any(|t| t.is_empty()) {
            return Err(ApiError::ValidationError("志愿目标ID不能为空".to_string()));
        }
        if targets.len() < MIN_CHOICES || targets.len() > MAX_CHOICES {
            return Err(ApiError::ValidationError(format!(
                "志愿数量必须在 {} 到 {} 之间，实际 {}",
                MIN_CHOICES,
                MAX_CHOICES,
                targets.len()
            )));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = targets.iter().find(|t| !seen.insert(t.as_str())) {
                return Err(ApiError::ValidationError(format!("志愿重复: {}", dup)));
            }
        }

        let student = self.student_repo.find_by_id(student_id)?.ok_or_else(|| {
            ApiError::ValidationError(format!("学生不存在: {}", student_id))
        })?;
        if !subject.admits(&student.batch_id, &student.program_id) {
            return Err(ApiError::ValidationError(format!(
                "学生 {} (batch={}, program={}) 不属于选课轮次 {}",
                student_id, student.batch_id, student.program_id, subject_id
            )));
        }

        let expected_kind = subject.allotment_type.target_kind();
        for target_id in &targets {
            match self.seat_repo.find(subject_id, target_id)? {
                Some(offering) if offering.target_kind == expected_kind => {}
                Some(offering) => {
                    return Err(ApiError::ValidationError(format!(
                        "志愿目标 {} 类型为 {}，与分配模式 {} 不符",
                        target_id, offering.target_kind, subject.allotment_type
                    )))
                }
                None => {
                    warn!(subject_id, student_id, target_id = %target_id, "志愿目标不存在");
                    return Err(ApiError::ValidationError(format!(
                        "志愿目标 {} 不属于选课轮次 {}",
                        target_id, subject_id
                    )));
                }
            }
        }

        let preference = Preference {
            subject_id: subject_id.to_string(),
            student_id: student_id.to_string(),
            choices: PreferenceChoices::for_type(subject.allotment_type, targets),
            submitted_at: Local::now().naive_local(),
        };
        self.preference_repo.replace(&preference)?;

        info!(
            subject_id,
            student_id,
            choices = preference.choices.targets().len(),
            "志愿已提交"
        );
        Ok(preference)
    }

    pub fn get_preference(&self, subject_id: &str, student_id: &str) -> ApiResult<Option<Preference>> {
        Ok(self.preference_repo.find(subject_id, student_id)?)
    }

    pub fn list_preferences(&self, subject_id: &str) -> ApiResult<Vec<Preference>> {
        Ok(self.preference_repo.list_by_subject(subject_id)?)
    }
}
