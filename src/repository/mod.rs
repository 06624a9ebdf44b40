// ==========================================
// 预约排程引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化, 防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod agenda_repo;
pub mod appointment_repo;
pub mod error;
pub mod schedule_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use agenda_repo::{AgendaRepository, ServiceRepository};
pub use appointment_repo::{
    AppointmentRepository, BucketClaim, CancelOutcome, CapacityOutcome,
};
pub use error::{RepositoryError, RepositoryResult};
pub use schedule_repo::ScheduleRuleRepository;
