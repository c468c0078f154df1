// ==========================================
// 选修课分配系统 - 选课轮次领域模型
// ==========================================
// 红线: preference_window_open 与 finalized 至多一个为 true
// ==========================================

use crate::domain::types::AllotmentType;
use serde::{Deserialize, Serialize};

// ==========================================
// Subject - 选课轮次
// ==========================================
// 用途: 一个批次的一次选课/分配活动
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: String,
    pub name: String,
    pub batch_id: String,            // 所属批次
    pub program_ids: Vec<String>,    // 适用专业
    pub allotment_type: AllotmentType,

    // ===== 生命周期标志 =====
    pub preference_window_open: bool, // 志愿填报窗口开放
    pub finalized: bool,              // 分配结果已定稿
}

impl Subject {
    /// 校验标志互斥
    ///
    /// # 返回
    /// - Ok(()): 至多一个标志为 true
    /// - Err(String): 违反互斥约束的原因
    pub fn check_flags(&self) -> Result<(), String> {
        if self.preference_window_open && self.finalized {
            return Err(format!(
                "选课轮次 {} 不能同时处于志愿开放与定稿状态",
                self.subject_id
            ));
        }
        Ok(())
    }

    /// 学生是否属于本轮次（批次 + 专业）
    pub fn admits(&self, batch_id: &str, program_id: &str) -> bool {
        self.batch_id == batch_id && self.program_ids.iter().any(|p| p == program_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(open: bool, finalized: bool) -> Subject {
        Subject {
            subject_id: "S1".to_string(),
            name: "Open Elective".to_string(),
            batch_id: "2024".to_string(),
            program_ids: vec!["CSE".to_string(), "ECE".to_string()],
            allotment_type: AllotmentType::Standalone,
            preference_window_open: open,
            finalized,
        }
    }

    #[test]
    fn test_flags_mutually_exclusive() {
        assert!(subject(false, false).check_flags().is_ok());
        assert!(subject(true, false).check_flags().is_ok());
        assert!(subject(false, true).check_flags().is_ok());
        assert!(subject(true, true).check_flags().is_err());
    }

    #[test]
    fn test_admits_batch_and_program() {
        let s = subject(true, false);
        assert!(s.admits("2024", "ECE"));
        assert!(!s.admits("2023", "ECE"));
        assert!(!s.admits("2024", "MECH"));
    }
}
