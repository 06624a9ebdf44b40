// ==========================================
// 预约排程引擎 - 可用性判定引擎
// ==========================================
// 职责: 取规则集 + 例外集, 合成指定日期/服务的开放窗口
// 红线: 不直接写库, 只计算和返回判定结果
// ==========================================
// 输入: horarios_atencion + horarios_servicios + bloqueos
// 输出: 当日开放窗口集 + 决策原因
// ==========================================

use crate::config::BookingConfigReader;
use crate::domain::schedule::parse_hhmm;
use crate::engine::availability_core::{AvailabilityCore, ResolutionInput, WindowSet};
use crate::repository::ScheduleRuleRepository;
use chrono::{Datelike, NaiveDate};
use std::error::Error;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// ResolvedDay - 某日的可用性判定结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ResolvedDay {
    pub fecha: NaiveDate,
    pub windows: WindowSet,
    pub reasons: Vec<String>,
}

impl ResolvedDay {
    /// 指定时刻（当日分钟数）是否开放
    pub fn is_open_at(&self, min: i32) -> bool {
        self.windows.contains(min)
    }
}

// ==========================================
// AvailabilityResolver - 可用性判定引擎
// ==========================================
// 红线: 判定为纯计算, 不持有预约锁, 不产生阻塞
pub struct AvailabilityResolver<C>
where
    C: BookingConfigReader,
{
    config: Arc<C>,
    schedule_repo: Arc<ScheduleRuleRepository>,
}

impl<C> AvailabilityResolver<C>
where
    C: BookingConfigReader,
{
    /// 创建新的 AvailabilityResolver 实例
    ///
    /// # 参数
    /// - config: 配置读取器
    /// - schedule_repo: 排班规则仓储
    pub fn new(config: Arc<C>, schedule_repo: Arc<ScheduleRuleRepository>) -> Self {
        Self {
            config,
            schedule_repo,
        }
    }

    /// 合成某日程某日（可选某服务）的开放窗口集
    ///
    /// # 参数
    /// - agenda_id: 日程 ID
    /// - fecha: 日期
    /// - service_id: 服务 ID（None = agenda 级视角）
    ///
    /// # 返回
    /// - ResolvedDay: 开放窗口集 + 决策原因
    #[instrument(skip(self), fields(agenda_id = %agenda_id, fecha = %fecha))]
    pub async fn resolve_day(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
        service_id: Option<&str>,
    ) -> Result<ResolvedDay, Box<dyn Error + Send + Sync>> {
        // 星期几: 0=周一 (与排班规则表一致)
        let dia_semana = fecha.weekday().num_days_from_monday() as i32;

        let default_closed_day = self.config.get_default_closed_day(agenda_id).await?;

        // 服务受限判定: 该服务在此 agenda 存在任意专属规则
        let (service_restricted, service_rules) = match service_id {
            Some(sid) => {
                let restricted = self
                    .schedule_repo
                    .has_service_schedule(agenda_id, sid)
                    .map_err(boxed)?;
                let rules = if restricted {
                    self.schedule_repo
                        .find_service_schedule(agenda_id, sid, dia_semana)
                        .map_err(boxed)?
                } else {
                    Vec::new()
                };
                (restricted, rules)
            }
            None => (false, Vec::new()),
        };

        let agenda_rules = self
            .schedule_repo
            .find_working_hours(agenda_id, dia_semana)
            .map_err(boxed)?;
        let exceptions = self
            .schedule_repo
            .find_exceptions_on(agenda_id, fecha)
            .map_err(boxed)?;

        let input = ResolutionInput {
            agenda_rules: &agenda_rules,
            service_rules: &service_rules,
            service_restricted,
            exceptions: &exceptions,
            service_id,
            default_closed_day,
        };

        let (windows, reasons) = AvailabilityCore::resolve_windows(&input);

        Ok(ResolvedDay {
            fecha,
            windows,
            reasons,
        })
    }

    /// 判定某时刻是否开放
    ///
    /// # 参数
    /// - hora: "HH:MM" 时刻字符串
    ///
    /// # 返回
    /// - (bool, ResolvedDay): 是否开放 + 当日完整判定
    pub async fn is_open(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
        hora: &str,
        service_id: Option<&str>,
    ) -> Result<(bool, ResolvedDay), Box<dyn Error + Send + Sync>> {
        let min = parse_hhmm(hora).ok_or_else(|| -> Box<dyn Error + Send + Sync> {
            format!("hora 格式非法: {}", hora).into()
        })?;

        let resolved = self.resolve_day(agenda_id, fecha, service_id).await?;
        let open = resolved.is_open_at(min);
        Ok((open, resolved))
    }
}

fn boxed(e: crate::repository::RepositoryError) -> Box<dyn Error + Send + Sync> {
    Box::new(e)
}
