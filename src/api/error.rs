// ==========================================
// 预约排程引擎 - API 层错误类型
// ==========================================
// 职责: 定义 API 层错误类型, 转换 Repository 错误与引擎拒绝
//       为带结构化细节的用户可见错误
// 约束: 拒绝必须携带桶标识/被违反的窗口, 客户端无需二次往返
//       即可提示最近的替代时段
// ==========================================

use crate::domain::schedule::format_minutes;
use crate::engine::booking::RejectionReason;
use crate::repository::error::RepositoryError;
use rust_i18n::t;
use thiserror::Error;

/// API 层错误类型
/// 所有拒绝信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误（单次调用致命, 不重试）
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 业务拒绝（可恢复, 引导用户换时段）
    // ==========================================
    #[error("时段未开放: agenda={agenda_id}, fecha={fecha}, detail={detail}")]
    OutsideSchedule {
        agenda_id: String,
        fecha: String,
        /// 判定原因链（规则层/例外层）
        detail: String,
        /// 当日实际开放窗口（"HH:MM-HH:MM"）
        windows: Vec<String>,
    },

    #[error("时长越出窗口: window_end={window_end}, overrun={overrun_min}分钟")]
    ExceedsWindow {
        window_end: String,
        overrun_min: i32,
    },

    #[error("时段已满: fecha={fecha}, bucket={bucket_start}, capacity={capacity}")]
    SlotFull {
        fecha: String,
        /// 桶的起始时刻（"HH:MM"）
        bucket_start: String,
        capacity: i32,
        committed: i64,
    },

    // ==========================================
    // 并发控制错误（可退避重试）
    // ==========================================
    #[error("预约繁忙: {0}")]
    Busy(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 面向门店端的本地化提示文本
    pub fn user_message(&self) -> String {
        match self {
            ApiError::InvalidInput(_) => t!("booking.invalid_input").to_string(),
            ApiError::NotFound(_) => t!("booking.not_found").to_string(),
            ApiError::OutsideSchedule { .. } => t!("booking.outside_schedule").to_string(),
            ApiError::ExceedsWindow { .. } => t!("booking.exceeds_window").to_string(),
            ApiError::SlotFull { .. } => t!("booking.slot_full").to_string(),
            ApiError::Busy(_) => t!("booking.busy").to_string(),
            _ => t!("booking.internal_error").to_string(),
        }
    }
}

// ==========================================
// 从引擎拒绝转换
// ==========================================
impl ApiError {
    /// 引擎拒绝 → API 错误（补充 agenda/fecha 上下文）
    pub fn from_rejection(agenda_id: &str, fecha: &str, reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::OutsideSchedule { reasons, windows } => ApiError::OutsideSchedule {
                agenda_id: agenda_id.to_string(),
                fecha: fecha.to_string(),
                detail: reasons.join("; "),
                windows: windows
                    .iter()
                    .map(|w| {
                        format!(
                            "{}-{}",
                            format_minutes(w.start_min),
                            format_minutes(w.end_min)
                        )
                    })
                    .collect(),
            },
            RejectionReason::ExceedsWindow {
                window_end_min,
                overrun_min,
            } => ApiError::ExceedsWindow {
                window_end: format_minutes(window_end_min),
                overrun_min,
            },
            RejectionReason::SlotFull {
                bucket,
                capacity,
                committed,
                granularity_min,
            } => ApiError::SlotFull {
                fecha: bucket.fecha.format("%Y-%m-%d").to_string(),
                bucket_start: format_minutes(bucket.start_minutes(granularity_min)),
                capacity,
                committed,
            },
            RejectionReason::Busy { timeout_ms } => {
                ApiError::Busy(format!("锁等待超过 {}ms, 请稍后重试", timeout_ms))
            }
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将 Repository 层的技术错误转换为用户可见的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::Busy(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::DatabaseError(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capacity::CapacityBucket;
    use chrono::NaiveDate;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Appointment".to_string(),
            id: "C001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Appointment"));
                assert!(msg.contains("C001"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_slot_full_rejection_carries_bucket_identity() {
        let reason = RejectionReason::SlotFull {
            bucket: CapacityBucket {
                agenda_id: "A1".to_string(),
                fecha: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                bucket_index: 10,
            },
            capacity: 2,
            committed: 2,
            granularity_min: 60,
        };
        let api_err = ApiError::from_rejection("A1", "2026-03-02", reason);
        match api_err {
            ApiError::SlotFull {
                fecha,
                bucket_start,
                capacity,
                committed,
            } => {
                assert_eq!(fecha, "2026-03-02");
                assert_eq!(bucket_start, "10:00");
                assert_eq!(capacity, 2);
                assert_eq!(committed, 2);
            }
            _ => panic!("Expected SlotFull"),
        }
    }

    #[test]
    fn test_user_message_localized() {
        rust_i18n::set_locale("es");
        let err = ApiError::SlotFull {
            fecha: "2026-03-02".to_string(),
            bucket_start: "10:00".to_string(),
            capacity: 2,
            committed: 2,
        };
        assert_eq!(err.user_message(), "Horario completo, actualice la disponibilidad");

        rust_i18n::set_locale("zh-CN");
        assert_eq!(err.user_message(), "该时段已约满，请刷新可用时段");
    }

    #[test]
    fn test_exceeds_window_rejection() {
        let reason = RejectionReason::ExceedsWindow {
            window_end_min: 1080,
            overrun_min: 30,
        };
        let api_err = ApiError::from_rejection("A1", "2026-03-02", reason);
        match api_err {
            ApiError::ExceedsWindow {
                window_end,
                overrun_min,
            } => {
                assert_eq!(window_end, "18:00");
                assert_eq!(overrun_min, 30);
            }
            _ => panic!("Expected ExceedsWindow"),
        }
    }
}
