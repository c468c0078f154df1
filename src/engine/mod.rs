// ==========================================
// 选修课分配系统 - 引擎层
// ==========================================
// 职责: 分班、分配计算与落库编排
// 红线: Engine 不拼 SQL, 每条落位必须带 reason
// ==========================================

pub mod allotment_engine;
pub mod error;
pub mod materializer;
pub mod repositories;
pub mod section_partitioner;

// 重导出核心引擎
pub use allotment_engine::{
    AllotmentEngine, AllotmentOutcome, AssignReason, Assignment, TargetSummary,
    UnassignedReason, UnassignedStudent,
};
pub use error::{EngineError, EngineResult};
pub use materializer::{AllotmentMaterializer, AllotmentReport, RunGuard};
pub use repositories::{
    AllotmentRepositories, AllotmentStore, MaterializationPlan, MemberRow, ReplaceOutcome,
};
pub use section_partitioner::{section_name, SectionPartitioner};
