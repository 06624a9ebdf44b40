// ==========================================
// 预约排程引擎 - 容量桶领域模型
// ==========================================
// 红线: 任意时刻 committed ≤ capacity
// 用途: 按 (agenda, 日期, 桶序号) 追踪已提交预约数
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::schedule::format_minutes;

// ==========================================
// CapacityBucket - 容量桶标识（派生, 不单独持久化）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacityBucket {
    pub agenda_id: String,
    pub fecha: NaiveDate,
    /// 桶序号 = 开始分钟数 / 桶粒度
    pub bucket_index: i32,
}

impl CapacityBucket {
    /// 桶的起始分钟数
    pub fn start_minutes(&self, granularity_min: i32) -> i32 {
        self.bucket_index * granularity_min
    }

    /// 展示用标签, 如 "2026-03-02 10:00"
    pub fn label(&self, granularity_min: i32) -> String {
        format!(
            "{} {}",
            self.fecha.format("%Y-%m-%d"),
            format_minutes(self.start_minutes(granularity_min))
        )
    }
}

// ==========================================
// Trait: CapacityCheck
// ==========================================
// 用途: 预约事务的容量约束检查接口
pub trait CapacityCheck {
    /// 是否还有空位
    fn has_room(&self) -> bool;

    /// 剩余容量
    fn remaining(&self) -> i64;

    /// 是否已满
    fn is_full(&self) -> bool;
}

// ==========================================
// BucketUsage - 桶的容量使用情况
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketUsage {
    pub bucket: CapacityBucket,
    /// 有效容量（容量策略决定来源）
    pub capacity: i32,
    /// 已提交（非取消）预约数
    pub committed: i64,
}

impl CapacityCheck for BucketUsage {
    fn has_room(&self) -> bool {
        self.committed < self.capacity as i64
    }

    fn remaining(&self) -> i64 {
        (self.capacity as i64 - self.committed).max(0)
    }

    fn is_full(&self) -> bool {
        self.committed >= self.capacity as i64
    }
}
