// ==========================================
// 预约排程引擎 - 排班规则领域模型
// ==========================================
// 职责: 定义周期排班规则、服务专属排班、封锁/开放例外
// 时间表示: 店内时间 "HH:MM" 字符串, 引擎内部为当日分钟数 (半开区间)
// ==========================================

use crate::domain::types::ExceptionKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 一天的总分钟数（窗口右端点可取到 24:00）
pub const MINUTES_PER_DAY: i32 = 24 * 60;

// ==========================================
// 时间工具函数
// ==========================================

/// 解析 "HH:MM" (兼容 "HH:MM:SS") 为当日分钟数
///
/// # 返回
/// - Some(minutos): 0..=1440（"24:00" 作为窗口右端点合法）
/// - None: 格式错误
pub fn parse_hhmm(s: &str) -> Option<i32> {
    let s = s.trim();
    let mut parts = s.splitn(3, ':');
    let hh: i32 = parts.next()?.parse().ok()?;
    let mm: i32 = parts.next()?.parse().ok()?;
    if !(0..=24).contains(&hh) || !(0..=59).contains(&mm) {
        return None;
    }
    let total = hh * 60 + mm;
    if total > MINUTES_PER_DAY {
        return None;
    }
    Some(total)
}

/// 将当日分钟数格式化为 "HH:MM"
pub fn format_minutes(min: i32) -> String {
    format!("{:02}:{:02}", min / 60, min % 60)
}

// ==========================================
// TimeWindow - 半开时间窗口 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_min: i32,
    pub end_min: i32,
}

impl TimeWindow {
    /// 构造窗口（空窗口或越界返回 None）
    pub fn new(start_min: i32, end_min: i32) -> Option<Self> {
        if start_min < 0 || end_min > MINUTES_PER_DAY || start_min >= end_min {
            return None;
        }
        Some(Self { start_min, end_min })
    }

    /// 全天窗口 [00:00, 24:00)
    pub fn full_day() -> Self {
        Self {
            start_min: 0,
            end_min: MINUTES_PER_DAY,
        }
    }

    /// 从 "HH:MM" 字符串对构造
    pub fn from_times(inicio: &str, fin: &str) -> Option<Self> {
        Self::new(parse_hhmm(inicio)?, parse_hhmm(fin)?)
    }

    /// 时刻是否落在窗口内
    pub fn contains(&self, min: i32) -> bool {
        self.start_min <= min && min < self.end_min
    }

    /// 区间 [start, end) 是否完整落在窗口内
    pub fn covers(&self, start: i32, end: i32) -> bool {
        self.start_min <= start && end <= self.end_min
    }

    /// 与另一窗口是否有交集
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }
}

// ==========================================
// WorkingHourRule - 门店周期排班 (horarios_atencion)
// ==========================================
// 约束: dia_semana 0-6 (0=周一), 同日允许多条规则（可重叠）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHourRule {
    pub id: i64,
    pub agenda_id: String,
    pub dia_semana: i32,
    pub hora_inicio: String, // "HH:MM"
    pub hora_fin: String,    // "HH:MM"
}

impl WorkingHourRule {
    /// 规则对应的时间窗口（时间格式非法时返回 None）
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::from_times(&self.hora_inicio, &self.hora_fin)
    }
}

// ==========================================
// ServiceScheduleRule - 服务专属排班 (horarios_servicios)
// ==========================================
// 语义: 某服务在该 agenda 存在任意一条规则时, 该服务
//       仅在自身规则的并集内可约, 不再继承门店排班
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceScheduleRule {
    pub id: i64,
    pub agenda_id: String,
    pub service_id: String,
    pub dia_semana: i32,
    pub hora_inicio: String,
    pub hora_fin: String,
}

impl ServiceScheduleRule {
    /// 规则对应的时间窗口（时间格式非法时返回 None）
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::from_times(&self.hora_inicio, &self.hora_fin)
    }
}

// ==========================================
// BlockException - 封锁/开放例外 (bloqueos)
// ==========================================
// 日期范围闭区间 [fecha_inicio, fecha_fin], 时间范围半开区间
// service_id 为空 → 整个 agenda 生效; 非空 → 仅该服务生效
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockException {
    pub id: i64,
    pub agenda_id: String,
    pub kind: ExceptionKind,
    pub fecha_inicio: NaiveDate,
    pub fecha_fin: NaiveDate,
    pub hora_inicio: Option<String>,
    pub hora_fin: Option<String>,
    pub es_todo_el_dia: bool,
    pub service_id: Option<String>,
    pub motivo: Option<String>,
}

impl BlockException {
    /// 例外是否覆盖指定日期
    pub fn applies_on(&self, fecha: NaiveDate) -> bool {
        self.fecha_inicio <= fecha && fecha <= self.fecha_fin
    }

    /// 例外实际生效的时间窗口
    ///
    /// # 规则
    /// - 整天例外且未附带更窄时间范围 → [00:00, 24:00)
    /// - 整天例外但同一条记录附带时间范围 → 仅该范围（人工缩窄优先）
    /// - 非整天例外 → 其时间范围; 缺失或非法时间 → None (不生效)
    pub fn effective_window(&self) -> Option<TimeWindow> {
        let explicit = match (&self.hora_inicio, &self.hora_fin) {
            (Some(inicio), Some(fin)) => TimeWindow::from_times(inicio, fin),
            _ => None,
        };
        if self.es_todo_el_dia {
            return Some(explicit.unwrap_or_else(TimeWindow::full_day));
        }
        explicit
    }
}
