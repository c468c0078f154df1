// ==========================================
// 选修课分配系统 - 学生领域模型
// ==========================================
// 学生主数据由外部管理系统维护，本系统只读
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub registration_no: String,           // 学号（确定性排序键）
    pub name: String,
    pub batch_id: String,
    pub program_id: String,
    pub prior_section_id: Option<String>,  // 原班级（就近分班提示）
    pub run_allotment: bool,               // 是否参加本次分配
}

// ==========================================
// Candidate - 参加分配的学生 + 志愿
// ==========================================
// 用途: 分配引擎输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub student: Student,
    pub choices: crate::domain::preference::PreferenceChoices,
}
