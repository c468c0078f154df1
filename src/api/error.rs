// ==========================================
// 选修课分配系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository/Engine错误为用户可读的错误消息
// 约束: 所有错误信息必须包含显式原因
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("座位不足: {0}")]
    CapacityError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("分配正在进行中: subject={0}")]
    AllotmentInProgress(String),

    #[error("分配已取消: subject={0}")]
    Cancelled(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            RepositoryError::CapacityExceeded {
                subject_id,
                target_id,
                requested,
                available,
            } => ApiError::CapacityError(format!(
                "subject={}, target={}, requested={}, available={}",
                subject_id, target_id, requested, available
            )),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }

            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repository(e) => e.into(),
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::Config(msg) => ApiError::ValidationError(format!("配置错误: {}", msg)),
            EngineError::InvalidState { subject_id, reason } => ApiError::InvalidStateTransition {
                from: format!("{}({})", subject_id, reason),
                to: "ALLOTTING".to_string(),
            },
            EngineError::AllotmentInProgress { subject_id } => {
                ApiError::AllotmentInProgress(subject_id)
            }
            EngineError::Cancelled { subject_id } => ApiError::Cancelled(subject_id),
            EngineError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_maps_to_capacity_error() {
        let err: ApiError = RepositoryError::CapacityExceeded {
            subject_id: "S1".to_string(),
            target_id: "C1".to_string(),
            requested: 3,
            available: 1,
        }
        .into();
        assert!(matches!(err, ApiError::CapacityError(_)));
        assert!(err.to_string().contains("target=C1"));
    }

    #[test]
    fn test_engine_errors_map() {
        let err: ApiError = EngineError::AllotmentInProgress {
            subject_id: "S1".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::AllotmentInProgress(ref s) if s == "S1"));

        let err: ApiError = EngineError::Repository(RepositoryError::NotFound {
            entity: "Subject".to_string(),
            id: "S9".to_string(),
        })
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
