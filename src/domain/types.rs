// ==========================================
// 选修课分配系统 - 领域类型定义
// ==========================================
// 职责: 分配模式、目标类型、运行状态等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 分配模式 (Allotment Type)
// ==========================================
// Standalone: 直接选课程; Bucket: 选课程组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllotmentType {
    Standalone, // 独立课程
    Bucket,     // 课程组
}

impl fmt::Display for AllotmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AllotmentType {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STANDALONE" => Some(AllotmentType::Standalone),
            "BUCKET" => Some(AllotmentType::Bucket),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AllotmentType::Standalone => "STANDALONE",
            AllotmentType::Bucket => "BUCKET",
        }
    }

    /// 该分配模式下座位目标的类型
    pub fn target_kind(&self) -> TargetKind {
        match self {
            AllotmentType::Standalone => TargetKind::Course,
            AllotmentType::Bucket => TargetKind::Bucket,
        }
    }
}

// ==========================================
// 座位目标类型 (Target Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    Course, // 课程
    Bucket, // 课程组
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl TargetKind {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "COURSE" => Some(TargetKind::Course),
            "BUCKET" => Some(TargetKind::Bucket),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TargetKind::Course => "COURSE",
            TargetKind::Bucket => "BUCKET",
        }
    }
}

// ==========================================
// 分配运行状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,   // 运行中
    Completed, // 已完成
    Failed,    // 失败(已回滚)
    Cancelled, // 已取消(已回滚)
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl RunStatus {
    /// 从字符串解析状态，未知值按 FAILED 处理
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RUNNING" => RunStatus::Running,
            "COMPLETED" => RunStatus::Completed,
            "CANCELLED" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 同序裁决 (Tie Break)
// ==========================================
// 决定两轮分配中学生的处理顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TieBreak {
    RegistrationNo, // 按学号排序（确定性）
    Discovery,      // 保持仓储返回顺序
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::RegistrationNo
    }
}

impl TieBreak {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "REGISTRATION_NO" => Some(TieBreak::RegistrationNo),
            "DISCOVERY" => Some(TieBreak::Discovery),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TieBreak::RegistrationNo => "REGISTRATION_NO",
            TieBreak::Discovery => "DISCOVERY",
        }
    }
}
