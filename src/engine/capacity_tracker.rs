// ==========================================
// 预约排程引擎 - 容量追踪器
// ==========================================
// 红线: 容量约束优先于任何预约意愿; committed ≤ capacity 恒成立
// 职责: 桶容量与已提交计数的只读投影
// 说明: 预约事务在自身原子段内重新读取计数,
//       本追踪器只服务于视图与诊断
// ==========================================

use crate::config::BookingConfigReader;
use crate::domain::agenda::{Agenda, Service};
use crate::domain::capacity::{BucketUsage, CapacityBucket};
use crate::domain::types::CapacityPolicy;
use crate::repository::{AgendaRepository, AppointmentRepository, ServiceRepository};
use chrono::NaiveDate;
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 桶区间计算（纯函数）
// ==========================================

/// 计算区间 [start, start+duration) 触及的全部桶序号
///
/// # 规则
/// - 桶序号 = 分钟数 / 粒度
/// - 跨桶预约必须在每个触及桶都有空位
pub fn touched_buckets(start_min: i32, duration_min: i32, granularity_min: i32) -> Vec<i32> {
    if duration_min <= 0 || granularity_min <= 0 {
        return Vec::new();
    }
    let first = start_min / granularity_min;
    let last = (start_min + duration_min - 1) / granularity_min;
    (first..=last).collect()
}

/// 开始时刻所属的桶序号
pub fn bucket_of(start_min: i32, granularity_min: i32) -> i32 {
    start_min / granularity_min
}

// ==========================================
// CapacityTracker - 容量追踪器
// ==========================================
pub struct CapacityTracker<C>
where
    C: BookingConfigReader,
{
    config: Arc<C>,
    agenda_repo: Arc<AgendaRepository>,
    service_repo: Arc<ServiceRepository>,
    appointment_repo: Arc<AppointmentRepository>,
}

impl<C> CapacityTracker<C>
where
    C: BookingConfigReader,
{
    /// 创建新的 CapacityTracker 实例
    pub fn new(
        config: Arc<C>,
        agenda_repo: Arc<AgendaRepository>,
        service_repo: Arc<ServiceRepository>,
        appointment_repo: Arc<AppointmentRepository>,
    ) -> Self {
        Self {
            config,
            agenda_repo,
            service_repo,
            appointment_repo,
        }
    }

    /// 某桶对指定服务的有效容量
    ///
    /// # 规则
    /// - 容量策略 AGENDA → agenda.slots_per_hour
    /// - 容量策略 SERVICE → max(1, service.concurrency)
    pub async fn capacity_of(
        &self,
        agenda_id: &str,
        service_id: &str,
    ) -> Result<i32, Box<dyn Error + Send + Sync>> {
        let policy = self.config.get_capacity_policy(agenda_id).await?;
        let agenda = self.require_agenda(agenda_id)?;

        match policy {
            CapacityPolicy::Agenda => Ok(agenda.slots_per_hour.max(1)),
            CapacityPolicy::Service => {
                let service = self.require_service(service_id)?;
                Ok(service.concurrency.max(1))
            }
        }
    }

    /// 某桶的已提交（非取消）预约数
    ///
    /// # 说明
    /// - 按策略决定计数范围: SERVICE 策略下只统计同服务预约
    pub async fn committed_count(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
        bucket_index: i32,
        service_id: &str,
    ) -> Result<i64, Box<dyn Error + Send + Sync>> {
        let policy = self.config.get_capacity_policy(agenda_id).await?;
        let granularity = self
            .config
            .get_bucket_granularity_minutes(agenda_id)
            .await?;

        let scope = match policy {
            CapacityPolicy::Agenda => None,
            CapacityPolicy::Service => Some(service_id),
        };

        self.appointment_repo
            .committed_count(agenda_id, fecha, bucket_index, granularity, scope)
            .map_err(|e| -> Box<dyn Error + Send + Sync> { Box::new(e) })
    }

    /// 某桶的完整使用情况（容量 + 已提交）
    pub async fn bucket_usage(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
        bucket_index: i32,
        service_id: &str,
    ) -> Result<BucketUsage, Box<dyn Error + Send + Sync>> {
        let capacity = self.capacity_of(agenda_id, service_id).await?;
        let committed = self
            .committed_count(agenda_id, fecha, bucket_index, service_id)
            .await?;

        Ok(BucketUsage {
            bucket: CapacityBucket {
                agenda_id: agenda_id.to_string(),
                fecha,
                bucket_index,
            },
            capacity,
            committed,
        })
    }

    fn require_agenda(&self, agenda_id: &str) -> Result<Agenda, Box<dyn Error + Send + Sync>> {
        self.agenda_repo
            .find_by_id(agenda_id)
            .map_err(|e| -> Box<dyn Error + Send + Sync> { Box::new(e) })?
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                format!("agenda 不存在: {}", agenda_id).into()
            })
    }

    fn require_service(&self, service_id: &str) -> Result<Service, Box<dyn Error + Send + Sync>> {
        self.service_repo
            .find_by_id(service_id)
            .map_err(|e| -> Box<dyn Error + Send + Sync> { Box::new(e) })?
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                format!("服务不存在: {}", service_id).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touched_buckets_single_hour() {
        // 10:00 + 30min, 粒度 60 → 仅 10 点桶
        assert_eq!(touched_buckets(600, 30, 60), vec![10]);
    }

    #[test]
    fn test_touched_buckets_exact_boundary() {
        // 10:00 + 60min → 仅 10 点桶（11:00 为右开端点）
        assert_eq!(touched_buckets(600, 60, 60), vec![10]);
    }

    #[test]
    fn test_touched_buckets_crossing_hour() {
        // 10:30 + 45min → 触及 10 点与 11 点两个桶
        assert_eq!(touched_buckets(630, 45, 60), vec![10, 11]);
    }

    #[test]
    fn test_touched_buckets_fine_granularity() {
        // 粒度 30: 10:00 + 45min → 桶 20 与 21
        assert_eq!(touched_buckets(600, 45, 30), vec![20, 21]);
    }

    #[test]
    fn test_touched_buckets_invalid_input() {
        assert!(touched_buckets(600, 0, 60).is_empty());
        assert!(touched_buckets(600, 30, 0).is_empty());
    }

    #[test]
    fn test_bucket_of() {
        assert_eq!(bucket_of(600, 60), 10);
        assert_eq!(bucket_of(630, 30), 21);
    }
}
