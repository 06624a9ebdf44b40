// ==========================================
// 预约排程引擎 - 排班例外 API
// ==========================================
// 职责: 封锁/开放例外的增删查（协作方的唯一提交型入口）
// 约束: 每次例外变更记录 ActionLog 并发布 ExceptionChanged 事件
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::schedule::{parse_hhmm, BlockException};
use crate::domain::types::ExceptionKind;
use crate::engine::events::{AgendaChangeEvent, AgendaEventKind, OptionalEventPublisher};
use crate::repository::{ActionLogRepository, ScheduleRuleRepository};

// ==========================================
// NewException - 例外创建请求
// ==========================================
#[derive(Debug, Clone)]
pub struct NewException {
    pub agenda_id: String,
    pub kind: ExceptionKind,
    pub fecha_inicio: String,
    pub fecha_fin: String,
    pub hora_inicio: Option<String>,
    pub hora_fin: Option<String>,
    pub es_todo_el_dia: bool,
    pub service_id: Option<String>,
    pub motivo: Option<String>,
}

// ==========================================
// ScheduleApi - 排班例外 API
// ==========================================
pub struct ScheduleApi {
    schedule_repo: Arc<ScheduleRuleRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    event_publisher: OptionalEventPublisher,
}

impl ScheduleApi {
    /// 创建新的 ScheduleApi 实例
    pub fn new(
        schedule_repo: Arc<ScheduleRuleRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        event_publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            schedule_repo,
            action_log_repo,
            event_publisher,
        }
    }

    /// 新增封锁/开放例外
    ///
    /// # 返回
    /// - Ok(i64): 例外 ID
    pub fn add_exception(&self, request: NewException, actor: &str) -> ApiResult<i64> {
        let fecha_inicio = parse_fecha(&request.fecha_inicio)?;
        let fecha_fin = parse_fecha(&request.fecha_fin)?;
        if fecha_inicio > fecha_fin {
            return Err(ApiError::InvalidInput(format!(
                "日期范围非法: {} > {}",
                request.fecha_inicio, request.fecha_fin
            )));
        }

        // 非整天例外必须携带合法时间范围
        if !request.es_todo_el_dia {
            let inicio = request
                .hora_inicio
                .as_deref()
                .and_then(parse_hhmm)
                .ok_or_else(|| {
                    ApiError::InvalidInput("非整天例外必须提供合法 hora_inicio".to_string())
                })?;
            let fin = request
                .hora_fin
                .as_deref()
                .and_then(parse_hhmm)
                .ok_or_else(|| {
                    ApiError::InvalidInput("非整天例外必须提供合法 hora_fin".to_string())
                })?;
            if inicio >= fin {
                return Err(ApiError::InvalidInput(format!(
                    "时间范围非法: {:?} >= {:?}",
                    request.hora_inicio, request.hora_fin
                )));
            }
        }

        let exception_id = self.schedule_repo.insert_exception(
            &request.agenda_id,
            request.kind,
            fecha_inicio,
            fecha_fin,
            request.hora_inicio.as_deref(),
            request.hora_fin.as_deref(),
            request.es_todo_el_dia,
            request.service_id.as_deref(),
            request.motivo.as_deref(),
        )?;

        info!(
            "例外已创建: id={}, agenda_id={}, kind={}",
            exception_id, request.agenda_id, request.kind
        );

        self.log_action(
            ActionType::AddException,
            &request.agenda_id,
            actor,
            format!(
                "新增例外: kind={}, {}..{}, motivo={}",
                request.kind,
                request.fecha_inicio,
                request.fecha_fin,
                request.motivo.as_deref().unwrap_or("-")
            ),
        );
        // 变更已提交, 通知订阅方刷新视图
        self.event_publisher.publish_best_effort(AgendaChangeEvent::new(
            request.agenda_id.clone(),
            AgendaEventKind::ExceptionChanged,
            Some(fecha_inicio),
            Some("ScheduleApi".to_string()),
        ));

        Ok(exception_id)
    }

    /// 删除例外
    pub fn remove_exception(&self, exception_id: i64, actor: &str) -> ApiResult<()> {
        let exception = self
            .schedule_repo
            .find_exception_by_id(exception_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("BlockException(id={})不存在", exception_id))
            })?;

        self.schedule_repo.delete_exception(exception_id)?;

        self.log_action(
            ActionType::RemoveException,
            &exception.agenda_id,
            actor,
            format!("删除例外: id={}", exception_id),
        );
        self.event_publisher.publish_best_effort(AgendaChangeEvent::new(
            exception.agenda_id.clone(),
            AgendaEventKind::ExceptionChanged,
            Some(exception.fecha_inicio),
            Some("ScheduleApi".to_string()),
        ));

        Ok(())
    }

    /// 查询日程的全部例外
    pub fn list_exceptions(&self, agenda_id: &str) -> ApiResult<Vec<BlockException>> {
        Ok(self.schedule_repo.list_exceptions(agenda_id)?)
    }

    /// ActionLog 为 best-effort, 失败只记警告
    fn log_action(&self, action_type: ActionType, agenda_id: &str, actor: &str, detail: String) {
        let log = ActionLog::new(
            action_type,
            Some(agenda_id.to_string()),
            None,
            actor.to_string(),
            Some(detail),
        );
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("ActionLog 写入失败(忽略): {}", e);
        }
    }
}

/// 解析 "YYYY-MM-DD" 日期
fn parse_fecha(fecha: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(fecha.trim(), "%Y-%m-%d")
        .map_err(|e| ApiError::InvalidInput(format!("fecha 格式非法 ({}): {}", fecha, e)))
}
