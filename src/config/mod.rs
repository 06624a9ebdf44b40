// ==========================================
// 预约排程引擎 - 配置层
// ==========================================
// 职责: 引擎配置的读取接口与 config_kv 存储实现
// ==========================================

pub mod booking_config_trait;
pub mod config_manager;

pub use booking_config_trait::BookingConfigReader;
pub use config_manager::{
    ConfigManager, DEFAULT_BOOKING_LOCK_TIMEOUT_MS, DEFAULT_BUCKET_GRANULARITY_MIN,
};
