// ==========================================
// 选修课分配系统 - 座位台账领域模型
// ==========================================
// 红线: 0 <= available_seats <= total_seats
// ==========================================

use crate::domain::types::TargetKind;
use serde::{Deserialize, Serialize};

// ==========================================
// SeatOffering - 座位供给
// ==========================================
// 主键: (subject_id, target_id)
// 用途: 分配开始时重置，落库时逐批扣减
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatOffering {
    // ===== 主键 =====
    pub subject_id: String,
    pub target_id: String,      // 课程ID 或 课程组ID

    pub target_kind: TargetKind,
    pub target_name: String,

    // ===== 座位 =====
    pub total_seats: u32,       // 总座位
    pub available_seats: u32,   // 剩余座位
}
