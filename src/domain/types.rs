// ==========================================
// 预约排程引擎 - 领域类型定义
// ==========================================
// 职责: 定义预约状态、例外类型、容量策略等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 预约状态 (Appointment Status)
// ==========================================
// 红线: 已取消的预约不占用任何容量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,   // 待确认
    Confirmed, // 已确认
    Cancelled, // 已取消
}

impl AppointmentStatus {
    /// 转换为数据库字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// 从数据库字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AppointmentStatus::Pending),
            "CONFIRMED" => Some(AppointmentStatus::Confirmed),
            "CANCELLED" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否占用容量
    pub fn occupies_capacity(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 例外类型 (Exception Kind)
// ==========================================
// 存储格式: bloqueos.tipo 整数列 (1=封锁, 2=开放)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionKind {
    Block,  // 封锁: 从原本开放的窗口中移除可用性
    Enable, // 开放: 在原本关闭的时段上增加可用性
}

impl ExceptionKind {
    /// 转换为数据库整数值
    pub fn as_i64(&self) -> i64 {
        match self {
            ExceptionKind::Block => 1,
            ExceptionKind::Enable => 2,
        }
    }

    /// 从数据库整数值解析
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(ExceptionKind::Block),
            2 => Some(ExceptionKind::Enable),
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::Block => write!(f, "BLOCK"),
            ExceptionKind::Enable => write!(f, "ENABLE"),
        }
    }
}

// ==========================================
// 容量策略 (Capacity Policy)
// ==========================================
// AGENDA: 桶容量取 agenda.slots_per_hour, 桶内所有预约共同竞争
// SERVICE: 桶容量取服务自身的 concurrency, 按服务分道计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityPolicy {
    Agenda,
    Service,
}

impl CapacityPolicy {
    /// 转换为配置字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityPolicy::Agenda => "AGENDA",
            CapacityPolicy::Service => "SERVICE",
        }
    }

    /// 从配置字符串解析（大小写不敏感）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGENDA" => Some(CapacityPolicy::Agenda),
            "SERVICE" => Some(CapacityPolicy::Service),
            _ => None,
        }
    }
}

impl fmt::Display for CapacityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_status_roundtrip() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_cancelled_does_not_occupy_capacity() {
        assert!(AppointmentStatus::Pending.occupies_capacity());
        assert!(AppointmentStatus::Confirmed.occupies_capacity());
        assert!(!AppointmentStatus::Cancelled.occupies_capacity());
    }

    #[test]
    fn test_exception_kind_db_values() {
        assert_eq!(ExceptionKind::Block.as_i64(), 1);
        assert_eq!(ExceptionKind::Enable.as_i64(), 2);
        assert_eq!(ExceptionKind::from_i64(2), Some(ExceptionKind::Enable));
        assert_eq!(ExceptionKind::from_i64(0), None);
    }

    #[test]
    fn test_capacity_policy_parse() {
        assert_eq!(CapacityPolicy::parse("agenda"), Some(CapacityPolicy::Agenda));
        assert_eq!(CapacityPolicy::parse("SERVICE"), Some(CapacityPolicy::Service));
        assert_eq!(CapacityPolicy::parse("other"), None);
    }
}
