// ==========================================
// 选修课分配系统 - 志愿领域模型
// ==========================================
// 主键: (subject_id, student_id)，最后一次提交生效
// ==========================================

use crate::domain::types::AllotmentType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 提交时志愿数量下限
pub const MIN_CHOICES: usize = 2;
/// 志愿数量上限
pub const MAX_CHOICES: usize = 3;

// ==========================================
// PreferenceChoices - 按分配模式区分的志愿
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferenceChoices {
    Standalone { courses: Vec<String> },
    Bucket { buckets: Vec<String> },
}

impl PreferenceChoices {
    /// 按分配模式构造
    pub fn for_type(allotment_type: AllotmentType, targets: Vec<String>) -> Self {
        match allotment_type {
            AllotmentType::Standalone => PreferenceChoices::Standalone { courses: targets },
            AllotmentType::Bucket => PreferenceChoices::Bucket { buckets: targets },
        }
    }

    /// 志愿目标（按志愿顺序）
    pub fn targets(&self) -> &[String] {
        match self {
            PreferenceChoices::Standalone { courses } => courses,
            PreferenceChoices::Bucket { buckets } => buckets,
        }
    }

    pub fn allotment_type(&self) -> AllotmentType {
        match self {
            PreferenceChoices::Standalone { .. } => AllotmentType::Standalone,
            PreferenceChoices::Bucket { .. } => AllotmentType::Bucket,
        }
    }

    /// 第一志愿
    pub fn first(&self) -> Option<&str> {
        self.targets().first().map(String::as_str)
    }
}

// ==========================================
// Preference - 学生志愿记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub subject_id: String,
    pub student_id: String,
    pub choices: PreferenceChoices,
    pub submitted_at: NaiveDateTime,
}
