// ==========================================
// 预约排程引擎 - 操作日志领域模型
// ==========================================
// 职责: 记录每次预约侧变更, 供审计与排障
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    BookAppointment,
    CancelAppointment,
    RescheduleAppointment,
    AddException,
    RemoveException,
}

impl ActionType {
    /// 转换为数据库字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BookAppointment => "BOOK_APPOINTMENT",
            ActionType::CancelAppointment => "CANCEL_APPOINTMENT",
            ActionType::RescheduleAppointment => "RESCHEDULE_APPOINTMENT",
            ActionType::AddException => "ADD_EXCEPTION",
            ActionType::RemoveException => "REMOVE_EXCEPTION",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// ActionLog - 操作日志 (action_log)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: String,
    pub action_type: ActionType,
    pub agenda_id: Option<String>,
    pub appointment_id: Option<String>,
    pub actor: String,
    pub detail: Option<String>,
    pub action_ts: DateTime<Utc>,
}

impl ActionLog {
    /// 构造一条新日志（时间戳取当前时刻）
    pub fn new(
        action_type: ActionType,
        agenda_id: Option<String>,
        appointment_id: Option<String>,
        actor: String,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            agenda_id,
            appointment_id,
            actor,
            detail,
            action_ts: Utc::now(),
        }
    }
}
