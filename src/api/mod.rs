// ==========================================
// 预约排程引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供服务边界/协作方调用
// ==========================================

pub mod booking_api;
pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use booking_api::{AvailabilityView, BookingApi, WindowView};
pub use error::{ApiError, ApiResult};
pub use schedule_api::{NewException, ScheduleApi};
