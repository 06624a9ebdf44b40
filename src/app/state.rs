// ==========================================
// 预约排程引擎 - 应用状态
// ==========================================
// 职责: 组装根; 管理共享连接、仓储、引擎与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{BookingApi, ScheduleApi};
use crate::config::config_manager::ConfigManager;
use crate::engine::{
    AgendaEventPublisher, AvailabilityResolver, BookingEngine, CapacityTracker, ChangeCallback,
    OptionalEventPublisher, SubscriptionHub,
};
use crate::repository::{
    ActionLogRepository, AgendaRepository, AppointmentRepository, ScheduleRuleRepository,
    ServiceRepository,
};

/// 应用状态
///
/// 包含所有 API 实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 预约 API
    pub booking_api: Arc<BookingApi<ConfigManager>>,

    /// 排班例外 API
    pub schedule_api: Arc<ScheduleApi>,

    /// 可用性判定引擎（视图/诊断用）
    pub availability: Arc<AvailabilityResolver<ConfigManager>>,

    /// 容量追踪器（视图/诊断用）
    pub capacity_tracker: Arc<CapacityTracker<ConfigManager>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 进程内变更订阅分发器
    pub subscription_hub: Arc<SubscriptionHub>,

    /// 日程仓储（协作方数据铺设用）
    pub agenda_repo: Arc<AgendaRepository>,

    /// 服务目录仓储（协作方数据铺设用）
    pub service_repo: Arc<ServiceRepository>,

    /// 排班规则仓储（协作方数据铺设用）
    pub schedule_repo: Arc<ScheduleRuleRepository>,

    /// 预约仓储（协作方状态流转用）
    pub appointment_repo: Arc<AppointmentRepository>,
}

impl AppState {
    /// 创建新的 AppState 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享连接并应用统一 PRAGMA
    /// 2. best-effort 建引擎自有表与索引
    /// 3. 初始化所有 Repository / Engine / API 实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;

        // Best-effort: 引擎自有表缺失时补建, 失败不阻塞启动
        if let Err(e) = crate::db::ensure_engine_schema(&conn) {
            tracing::warn!("引擎表初始化失败(将继续启动): {}", e);
        }
        match crate::db::read_schema_version(&conn) {
            Ok(Some(v)) if v != crate::db::CURRENT_SCHEMA_VERSION => {
                tracing::warn!(
                    "schema_version 不匹配: 库内={}, 期望={}",
                    v,
                    crate::db::CURRENT_SCHEMA_VERSION
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("schema_version 读取失败: {}", e),
        }
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let agenda_repo = Arc::new(AgendaRepository::from_connection(conn.clone()));
        let service_repo = Arc::new(ServiceRepository::from_connection(conn.clone()));
        let schedule_repo = Arc::new(ScheduleRuleRepository::from_connection(conn.clone()));
        let appointment_repo = Arc::new(AppointmentRepository::from_connection(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::from_connection(conn.clone()));

        // ==========================================
        // 初始化Engine层
        // ==========================================

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // 进程内订阅分发器（on_change 订阅面）
        let subscription_hub = Arc::new(SubscriptionHub::new());
        let event_publisher = OptionalEventPublisher::with_publisher(
            subscription_hub.clone() as Arc<dyn AgendaEventPublisher>
        );

        // 可用性判定引擎
        let availability = Arc::new(AvailabilityResolver::new(
            config_manager.clone(),
            schedule_repo.clone(),
        ));

        // 容量追踪器
        let capacity_tracker = Arc::new(CapacityTracker::new(
            config_manager.clone(),
            agenda_repo.clone(),
            service_repo.clone(),
            appointment_repo.clone(),
        ));

        // 预约事务引擎
        let booking_engine = Arc::new(BookingEngine::new(
            config_manager.clone(),
            availability.clone(),
            agenda_repo.clone(),
            service_repo.clone(),
            appointment_repo.clone(),
            event_publisher,
        ));

        // ==========================================
        // 初始化API层
        // ==========================================

        let booking_api = Arc::new(BookingApi::new(
            booking_engine,
            availability.clone(),
            agenda_repo.clone(),
            service_repo.clone(),
            appointment_repo.clone(),
            action_log_repo.clone(),
        ));

        let schedule_api = Arc::new(ScheduleApi::new(
            schedule_repo.clone(),
            action_log_repo,
            OptionalEventPublisher::with_publisher(
                subscription_hub.clone() as Arc<dyn AgendaEventPublisher>
            ),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            booking_api,
            schedule_api,
            availability,
            capacity_tracker,
            config_manager,
            subscription_hub,
            agenda_repo,
            service_repo,
            schedule_repo,
            appointment_repo,
        })
    }

    /// 注册某 agenda 的变更回调（on_change 订阅面）
    pub fn on_change(&self, agenda_id: &str, callback: ChangeCallback) {
        self.subscription_hub.subscribe(agenda_id, callback);
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 开发环境: 用户数据目录/agenda-booking-dev/agenda_booking.db
/// - 生产环境: 用户数据目录/agenda-booking/agenda_booking.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("AGENDA_BOOKING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    // 先给一个默认回退值，后续如果能拿到 data_dir 再覆盖。
    let mut path = PathBuf::from("./agenda_booking.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("agenda-booking-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("agenda-booking");
        }

        std::fs::create_dir_all(&path).ok();
        path = path.join("agenda_booking.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    // 注意：AppState::new() 的测试需要真实的数据库文件
    // 这些测试在集成测试中进行
}
