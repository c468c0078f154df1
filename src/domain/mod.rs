// ==========================================
// 选修课分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod allotment_run;
pub mod preference;
pub mod seat;
pub mod section;
pub mod student;
pub mod subject;
pub mod types;

// 重导出核心类型
pub use allotment_run::AllotmentRun;
pub use preference::{Preference, PreferenceChoices, MAX_CHOICES, MIN_CHOICES};
pub use seat::SeatOffering;
pub use section::{AllotmentRecord, Section, SECTION_CAPACITY, SECTION_ID_SEPARATOR};
pub use student::{Candidate, Student};
pub use subject::Subject;
pub use types::{AllotmentType, RunStatus, TargetKind, TieBreak};
