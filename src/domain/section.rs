// ==========================================
// 选修课分配系统 - 分班领域模型
// ==========================================
// 红线: 每班人数 <= capacity
// 生命周期: 每次分配全量删除后重建，不做增量
// ==========================================

use crate::domain::types::TargetKind;
use serde::{Deserialize, Serialize};

/// 默认班级容量
pub const SECTION_CAPACITY: u32 = 70;

/// section_id 分隔符，选课轮次ID与目标ID中不得出现
pub const SECTION_ID_SEPARATOR: char = ':';

/// 拼接 section_id: {subject}:{target}:{name}
pub fn make_section_id(subject_id: &str, target_id: &str, name: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        subject_id,
        target_id,
        name,
        sep = SECTION_ID_SEPARATOR
    )
}

/// 校验参与拼接 section_id 的键（非空、不含分隔符）
pub fn check_id_part(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} 不能为空", field));
    }
    if value.contains(SECTION_ID_SEPARATOR) {
        return Err(format!(
            "{} 不能包含 '{}': {}",
            field, SECTION_ID_SEPARATOR, value
        ));
    }
    Ok(())
}

// ==========================================
// Section - 教学班
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,
    pub subject_id: String,
    pub target_id: String,
    pub name: String,        // A, B, C ...
    pub capacity: u32,
    pub member_count: u32,
}

impl Section {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.member_count)
    }
}

// ==========================================
// AllotmentRecord - 分配结果读模型
// ==========================================
// 用途: getAllotments 返回给学生端/管理端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentRecord {
    pub subject_id: String,
    pub student_id: String,
    pub registration_no: String,
    pub student_name: String,
    pub target_id: String,
    pub target_kind: TargetKind,
    pub target_name: String,
    pub section_id: String,
    pub section_name: String,
}
