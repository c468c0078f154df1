// ==========================================
// 选修课分配系统 - 分配运行记录
// ==========================================
// 红线: 每次 runAllotment 必须留痕
// 用途: 审计追踪、定稿前置检查
// ==========================================

use crate::domain::types::RunStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllotmentRun {
    pub run_id: String,
    pub subject_id: String,
    pub status: RunStatus,
    pub triggered_by: String,

    // ===== 结果统计 =====
    pub allotted_count: u32,
    pub unallotted_count: u32,

    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,

    pub summary_json: Option<JsonValue>, // 各目标分配人数
    pub detail: Option<String>,          // 失败原因
}
