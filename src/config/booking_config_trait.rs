// ==========================================
// 预约排程引擎 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义预约引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::CapacityPolicy;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// BookingConfigReader Trait
// ==========================================
// 用途: 预约引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取, agenda 作用域优先）
#[async_trait]
pub trait BookingConfigReader: Send + Sync {
    /// 获取容量策略
    ///
    /// # 返回
    /// - CapacityPolicy::Agenda: 桶容量取 agenda.slots_per_hour
    /// - CapacityPolicy::Service: 桶容量取服务自身 concurrency
    ///
    /// # 默认值
    /// - AGENDA
    async fn get_capacity_policy(
        &self,
        agenda_id: &str,
    ) -> Result<CapacityPolicy, Box<dyn Error + Send + Sync>>;

    /// 获取容量桶粒度（分钟）
    ///
    /// # 约束
    /// - 必须整除 1440; 非法配置回退默认值
    ///
    /// # 默认值
    /// - 60
    async fn get_bucket_granularity_minutes(
        &self,
        agenda_id: &str,
    ) -> Result<i32, Box<dyn Error + Send + Sync>>;

    /// 无任何排班规则的日期是否视为闭店
    ///
    /// # 默认值
    /// - true
    async fn get_default_closed_day(
        &self,
        agenda_id: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;

    /// 预约串行锁的等待上限（毫秒, 仅 global 作用域）
    ///
    /// # 默认值
    /// - 5000
    async fn get_booking_lock_timeout_ms(&self) -> Result<u64, Box<dyn Error + Send + Sync>>;
}
