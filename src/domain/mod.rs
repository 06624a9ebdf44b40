// ==========================================
// 预约排程引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、容量检查接口
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod agenda;
pub mod appointment;
pub mod capacity;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use agenda::{Agenda, Service};
pub use appointment::{Appointment, BookingRequest};
pub use capacity::{BucketUsage, CapacityBucket, CapacityCheck};
pub use schedule::{
    format_minutes, parse_hhmm, BlockException, ServiceScheduleRule, TimeWindow, WorkingHourRule,
    MINUTES_PER_DAY,
};
pub use types::{AppointmentStatus, CapacityPolicy, ExceptionKind};
