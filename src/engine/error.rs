// ==========================================
// 选修课分配系统 - 引擎层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("分配校验失败: {0}")]
    Validation(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("选课轮次 {subject_id} 当前状态不允许分配: {reason}")]
    InvalidState { subject_id: String, reason: String },

    #[error("选课轮次 {subject_id} 的分配正在进行中")]
    AllotmentInProgress { subject_id: String },

    #[error("分配已取消: subject={subject_id}")]
    Cancelled { subject_id: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
