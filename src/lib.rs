// ==========================================
// 选修课分配系统 - 核心库
// ==========================================
// 职责: 志愿收集、座位台账、分班与分配
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分班与分配
pub mod engine;

// 配置层 - 分配参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AllotmentType, RunStatus, TargetKind, TieBreak};

// 领域实体
pub use domain::{
    AllotmentRecord, AllotmentRun, Candidate, Preference, PreferenceChoices, SeatOffering,
    Section, Student, Subject,
};

// 引擎
pub use engine::{AllotmentEngine, AllotmentMaterializer, AllotmentReport, SectionPartitioner};

// API
pub use api::{AllotmentApi, ApiError, PreferenceApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "选修课分配系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
