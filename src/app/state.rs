// ==========================================
// 选修课分配系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{AllotmentApi, PreferenceApi};
use crate::config::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{AllotmentMaterializer, AllotmentRepositories};

/// 应用状态
///
/// 所有仓储与API共享同一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 仓储集合（种子数据写入、测试直接访问）
    pub repos: AllotmentRepositories,

    pub config_manager: Arc<ConfigManager>,

    /// 志愿API
    pub preference_api: Arc<PreferenceApi>,

    /// 分配API
    pub allotment_api: Arc<AllotmentApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 打开数据库并补齐表结构，然后初始化仓储、引擎与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)))
    }

    /// 从已打开（且已建表）的连接创建
    pub fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        let repos = AllotmentRepositories::new(conn);
        let materializer = AllotmentMaterializer::new(Arc::new(repos.clone()));

        let preference_api = Arc::new(PreferenceApi::new(
            repos.subject_repo.clone(),
            repos.student_repo.clone(),
            repos.seat_repo.clone(),
            repos.preference_repo.clone(),
        ));
        let allotment_api = Arc::new(AllotmentApi::new(
            repos.clone(),
            materializer,
            config_manager.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            repos,
            config_manager,
            preference_api,
            allotment_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先读取 ELECTIVE_ALLOTMENT_DB_PATH，否则使用用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("ELECTIVE_ALLOTMENT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./elective_allotment.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("elective-allotment");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("elective_allotment.db");
        }
    }

    path.to_string_lossy().to_string()
}
