// ==========================================
// 选修课分配系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口，供命令行与上层服务调用
// ==========================================

pub mod allotment_api;
pub mod error;
pub mod preference_api;

// 重导出核心类型
pub use allotment_api::{AllotmentApi, SeatSummary};
pub use error::{ApiError, ApiResult};
pub use preference_api::PreferenceApi;
