// ==========================================
// 预约排程引擎 - 预约 API
// ==========================================
// 职责: 预约提交/取消/改期与可用性查询的业务接口
// 约束: 边界接收字符串日期/时刻, 解析失败返回 InvalidInput;
//       每次提交型操作记录 ActionLog
// ==========================================

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::config::BookingConfigReader;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::appointment::{Appointment, BookingRequest};
use crate::domain::schedule::{format_minutes, parse_hhmm};
use crate::engine::availability::AvailabilityResolver;
use crate::engine::booking::{BookingDecision, BookingEngine, EditDecision};
use crate::repository::{
    ActionLogRepository, AgendaRepository, AppointmentRepository, CancelOutcome, ServiceRepository,
};

/// 可用性范围查询的最大跨度（天）
const MAX_RANGE_DAYS: i64 = 62;

// ==========================================
// 视图结构
// ==========================================

/// 开放窗口视图（"HH:MM" 边界）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowView {
    pub inicio: String,
    pub fin: String,
}

/// 某日可用性视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityView {
    pub agenda_id: String,
    pub fecha: String,
    /// 查询带时刻时的开放判定（未带时刻为 None）
    pub open: Option<bool>,
    pub windows: Vec<WindowView>,
    pub reasons: Vec<String>,
}

// ==========================================
// BookingApi - 预约 API
// ==========================================

/// 预约API
///
/// 职责：
/// 1. 可用性查询（单日 / 日期范围）
/// 2. 预约提交、取消、改期
/// 3. ActionLog 记录
pub struct BookingApi<C>
where
    C: BookingConfigReader,
{
    booking_engine: Arc<BookingEngine<C>>,
    availability: Arc<AvailabilityResolver<C>>,
    agenda_repo: Arc<AgendaRepository>,
    service_repo: Arc<ServiceRepository>,
    appointment_repo: Arc<AppointmentRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl<C> BookingApi<C>
where
    C: BookingConfigReader,
{
    /// 创建新的 BookingApi 实例
    pub fn new(
        booking_engine: Arc<BookingEngine<C>>,
        availability: Arc<AvailabilityResolver<C>>,
        agenda_repo: Arc<AgendaRepository>,
        service_repo: Arc<ServiceRepository>,
        appointment_repo: Arc<AppointmentRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            booking_engine,
            availability,
            agenda_repo,
            service_repo,
            appointment_repo,
            action_log_repo,
        }
    }

    // ==========================================
    // 可用性查询
    // ==========================================

    /// 查询某日（可选某时刻/某服务）的可用性
    ///
    /// # 参数
    /// - fecha: "YYYY-MM-DD"
    /// - hora: 可选 "HH:MM"
    /// - service_id: 可选服务过滤
    pub async fn resolve_availability(
        &self,
        agenda_id: &str,
        fecha: &str,
        hora: Option<&str>,
        service_id: Option<&str>,
    ) -> ApiResult<AvailabilityView> {
        let fecha_parsed = parse_fecha(fecha)?;
        self.require_agenda(agenda_id)?;
        if let Some(sid) = service_id {
            self.require_service(sid)?;
        }
        let hora_min = match hora {
            Some(h) => Some(
                parse_hhmm(h)
                    .ok_or_else(|| ApiError::InvalidInput(format!("hora 格式非法: {}", h)))?,
            ),
            None => None,
        };

        let resolved = self
            .availability
            .resolve_day(agenda_id, fecha_parsed, service_id)
            .await
            .map_err(internal)?;

        debug!(
            "可用性查询: agenda_id={}, fecha={}, windows={}",
            agenda_id,
            fecha,
            resolved.windows.windows().len()
        );

        Ok(AvailabilityView {
            agenda_id: agenda_id.to_string(),
            fecha: fecha.to_string(),
            open: hora_min.map(|min| resolved.is_open_at(min)),
            windows: resolved
                .windows
                .windows()
                .iter()
                .map(|w| WindowView {
                    inicio: format_minutes(w.start_min),
                    fin: format_minutes(w.end_min),
                })
                .collect(),
            reasons: resolved.reasons,
        })
    }

    /// 查询日期范围的逐日可用性（日历视图用）
    ///
    /// # 约束
    /// - fecha_desde ≤ fecha_hasta, 跨度不超过 62 天
    pub async fn resolve_availability_range(
        &self,
        agenda_id: &str,
        fecha_desde: &str,
        fecha_hasta: &str,
        service_id: Option<&str>,
    ) -> ApiResult<Vec<AvailabilityView>> {
        let desde = parse_fecha(fecha_desde)?;
        let hasta = parse_fecha(fecha_hasta)?;
        if desde > hasta {
            return Err(ApiError::InvalidInput(format!(
                "日期范围非法: {} > {}",
                fecha_desde, fecha_hasta
            )));
        }
        let span_days = (hasta - desde).num_days();
        if span_days > MAX_RANGE_DAYS {
            return Err(ApiError::InvalidInput(format!(
                "日期范围过大: {}天 (上限{}天)",
                span_days, MAX_RANGE_DAYS
            )));
        }
        self.require_agenda(agenda_id)?;
        if let Some(sid) = service_id {
            self.require_service(sid)?;
        }

        let days: Vec<NaiveDate> = (0..=span_days)
            .map(|offset| desde + Duration::days(offset))
            .collect();

        let futures = days.iter().map(|fecha| async move {
            let resolved = self
                .availability
                .resolve_day(agenda_id, *fecha, service_id)
                .await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(AvailabilityView {
                agenda_id: agenda_id.to_string(),
                fecha: fecha.format("%Y-%m-%d").to_string(),
                open: None,
                windows: resolved
                    .windows
                    .windows()
                    .iter()
                    .map(|w| WindowView {
                        inicio: format_minutes(w.start_min),
                        fin: format_minutes(w.end_min),
                    })
                    .collect(),
                reasons: resolved.reasons,
            })
        });

        join_all(futures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)
    }

    // ==========================================
    // 提交型操作
    // ==========================================

    /// 提交预约
    ///
    /// # 参数
    /// - cliente: 客户属性（引擎不解释）
    /// - idempotency_key: 可选去重键
    /// - actor: 操作者（坐席）
    #[allow(clippy::too_many_arguments)]
    pub async fn book(
        &self,
        agenda_id: &str,
        service_id: &str,
        fecha: &str,
        hora: &str,
        cliente: serde_json::Value,
        idempotency_key: Option<String>,
        actor: &str,
    ) -> ApiResult<Appointment> {
        let fecha_parsed = parse_fecha(fecha)?;
        let hora_parsed = parse_hora(hora)?;
        self.require_agenda(agenda_id)?;
        self.require_service(service_id)?;

        let request = BookingRequest {
            agenda_id: agenda_id.to_string(),
            service_id: service_id.to_string(),
            fecha: fecha_parsed,
            hora: hora_parsed,
            cliente,
            idempotency_key,
        };

        let decision = self.booking_engine.book(request).await.map_err(internal)?;

        match decision {
            BookingDecision::Booked(cita) => {
                self.log_action(
                    ActionType::BookAppointment,
                    agenda_id,
                    Some(&cita.id),
                    actor,
                    format!("提交预约: fecha={}, hora={}, service={}", fecha, hora, service_id),
                );
                Ok(cita)
            }
            BookingDecision::Rejected(reason) => {
                Err(ApiError::from_rejection(agenda_id, fecha, reason))
            }
        }
    }

    /// 取消预约
    ///
    /// # 返回
    /// - Ok(true): 本次取消生效
    /// - Ok(false): 之前已取消（幂等空操作）
    /// - Err(NotFound): 预约不存在
    pub async fn cancel(&self, appointment_id: &str, actor: &str) -> ApiResult<bool> {
        match self
            .booking_engine
            .cancel(appointment_id)
            .await
            .map_err(internal)?
        {
            CancelOutcome::Cancelled => {
                // 事后补充 agenda 上下文
                let agenda_id = self
                    .appointment_repo
                    .find_by_id(appointment_id)?
                    .map(|c| c.agenda_id)
                    .unwrap_or_default();
                self.log_action(
                    ActionType::CancelAppointment,
                    &agenda_id,
                    Some(appointment_id),
                    actor,
                    format!("取消预约: id={}", appointment_id),
                );
                Ok(true)
            }
            CancelOutcome::AlreadyCancelled => Ok(false),
            CancelOutcome::NotFound => Err(ApiError::NotFound(format!(
                "Appointment(id={})不存在",
                appointment_id
            ))),
        }
    }

    /// 改期（可同时换服务）
    pub async fn edit_slot(
        &self,
        appointment_id: &str,
        fecha: &str,
        hora: &str,
        service_id: Option<&str>,
        actor: &str,
    ) -> ApiResult<Appointment> {
        let fecha_parsed = parse_fecha(fecha)?;
        let hora_parsed = parse_hora(hora)?;
        if let Some(sid) = service_id {
            self.require_service(sid)?;
        }

        let decision = self
            .booking_engine
            .edit_slot(appointment_id, fecha_parsed, hora_parsed, service_id)
            .await
            .map_err(internal)?;

        match decision {
            EditDecision::Updated(cita) => {
                self.log_action(
                    ActionType::RescheduleAppointment,
                    &cita.agenda_id,
                    Some(&cita.id),
                    actor,
                    format!("预约改期: fecha={}, hora={}", fecha, hora),
                );
                Ok(cita)
            }
            EditDecision::Rejected(reason) => {
                let agenda_id = self
                    .appointment_repo
                    .find_by_id(appointment_id)?
                    .map(|c| c.agenda_id)
                    .unwrap_or_default();
                Err(ApiError::from_rejection(&agenda_id, fecha, reason))
            }
            EditDecision::NotFound => Err(ApiError::NotFound(format!(
                "Appointment(id={})不存在",
                appointment_id
            ))),
        }
    }

    /// 按 ID 查询预约
    pub fn get_appointment(&self, appointment_id: &str) -> ApiResult<Appointment> {
        self.appointment_repo
            .find_by_id(appointment_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Appointment(id={})不存在", appointment_id)))
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn require_agenda(&self, agenda_id: &str) -> ApiResult<()> {
        if self.agenda_repo.find_by_id(agenda_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Agenda(id={})不存在", agenda_id)));
        }
        Ok(())
    }

    fn require_service(&self, service_id: &str) -> ApiResult<()> {
        if self.service_repo.find_by_id(service_id)?.is_none() {
            return Err(ApiError::InvalidInput(format!("服务不存在: {}", service_id)));
        }
        Ok(())
    }

    /// ActionLog 为 best-effort, 失败只记警告
    fn log_action(
        &self,
        action_type: ActionType,
        agenda_id: &str,
        appointment_id: Option<&str>,
        actor: &str,
        detail: String,
    ) {
        let log = ActionLog::new(
            action_type,
            Some(agenda_id.to_string()),
            appointment_id.map(|s| s.to_string()),
            actor.to_string(),
            Some(detail),
        );
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("ActionLog 写入失败(忽略): {}", e);
        }
    }
}

// ==========================================
// 边界解析工具
// ==========================================

/// 解析 "YYYY-MM-DD" 日期
fn parse_fecha(fecha: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(fecha.trim(), "%Y-%m-%d")
        .map_err(|e| ApiError::InvalidInput(format!("fecha 格式非法 ({}): {}", fecha, e)))
}

/// 解析 "HH:MM" 时刻（预约起点不允许 24:00）
fn parse_hora(hora: &str) -> ApiResult<NaiveTime> {
    NaiveTime::parse_from_str(hora.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(hora.trim(), "%H:%M:%S"))
        .map_err(|e| ApiError::InvalidInput(format!("hora 格式非法 ({}): {}", hora, e)))
}

fn internal(e: Box<dyn std::error::Error + Send + Sync>) -> ApiError {
    ApiError::InternalError(e.to_string())
}
