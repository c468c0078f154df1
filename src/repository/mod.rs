// ==========================================
// 选修课分配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod allotment_run_repo;
pub mod error;
pub mod preference_repo;
pub mod seat_repo;
pub mod section_repo;
pub mod student_repo;
pub mod subject_repo;

// 重导出核心仓储
pub use allotment_run_repo::AllotmentRunRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use preference_repo::PreferenceRepository;
pub use seat_repo::SeatOfferingRepository;
pub use section_repo::SectionRepository;
pub use student_repo::StudentRepository;
pub use subject_repo::SubjectRepository;
