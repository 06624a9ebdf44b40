// ==========================================
// 预约排程引擎 - 预约领域模型
// ==========================================
// 职责: 定义预约实体与预约请求
// 说明: 客户属性对引擎完全不透明, 以 JSON 原样存取
// ==========================================

use crate::domain::types::AppointmentStatus;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Appointment - 预约 (citas)
// ==========================================
// 生命周期: 预约事务创建 (PENDING) → 协作方确认/改期 → 取消释放容量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub agenda_id: String,
    pub service_id: String,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub estado: AppointmentStatus,
    /// 客户属性（引擎不解释）
    pub cliente: serde_json::Value,
    /// 去重键: 同一键重复提交返回已存在的预约
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// 预约开始时刻的当日分钟数
    pub fn start_minutes(&self) -> i32 {
        use chrono::Timelike;
        (self.hora.hour() * 60 + self.hora.minute()) as i32
    }
}

// ==========================================
// BookingRequest - 预约请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub agenda_id: String,
    pub service_id: String,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub cliente: serde_json::Value,
    pub idempotency_key: Option<String>,
}
