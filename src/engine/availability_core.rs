// ==========================================
// 预约排程引擎 - Availability Core 纯函数库
// ==========================================
// 职责: 提供窗口集代数与开放/关闭判定的纯逻辑
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================
// 判定优先级（后者覆盖前者）:
// 1. 基础窗口集: 服务受限 → 服务专属规则; 否则门店规则
// 2. 减去 agenda 级封锁例外
// 3. 减去服务级封锁例外
// 4. 加回 agenda 级开放例外（开放永远胜过封锁）
// 5. 加回服务级开放例外
// ==========================================

use crate::domain::schedule::{
    BlockException, ServiceScheduleRule, TimeWindow, WorkingHourRule,
};
use crate::domain::types::ExceptionKind;

// ==========================================
// WindowSet - 规范化窗口集
// ==========================================
// 不变式: 窗口按起点排序、互不重叠、相邻窗口已合并
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowSet {
    windows: Vec<TimeWindow>,
}

impl WindowSet {
    /// 空集
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从任意窗口列表构造（排序 + 合并重叠/相邻）
    pub fn from_windows(mut windows: Vec<TimeWindow>) -> Self {
        windows.sort_by_key(|w| (w.start_min, w.end_min));

        let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
        for w in windows {
            match merged.last_mut() {
                // 相邻窗口合并: [8,12)+[12,14) 构成一段连续开放时段
                Some(last) if w.start_min <= last.end_min => {
                    last.end_min = last.end_min.max(w.end_min);
                }
                _ => merged.push(w),
            }
        }

        Self { windows: merged }
    }

    /// 窗口列表（已规范化）
    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// 加入一个窗口
    pub fn add(&mut self, window: TimeWindow) {
        let mut all = self.windows.clone();
        all.push(window);
        *self = Self::from_windows(all);
    }

    /// 减去一个窗口
    pub fn subtract(&mut self, block: TimeWindow) {
        let mut result: Vec<TimeWindow> = Vec::with_capacity(self.windows.len() + 1);
        for w in &self.windows {
            if !w.overlaps(&block) {
                result.push(*w);
                continue;
            }
            // 左残段
            if w.start_min < block.start_min {
                if let Some(left) = TimeWindow::new(w.start_min, block.start_min) {
                    result.push(left);
                }
            }
            // 右残段
            if block.end_min < w.end_min {
                if let Some(right) = TimeWindow::new(block.end_min, w.end_min) {
                    result.push(right);
                }
            }
        }
        self.windows = result;
    }

    /// 时刻是否开放
    pub fn contains(&self, min: i32) -> bool {
        self.windows.iter().any(|w| w.contains(min))
    }

    /// 包含指定时刻的窗口
    pub fn window_containing(&self, min: i32) -> Option<TimeWindow> {
        self.windows.iter().find(|w| w.contains(min)).copied()
    }

    /// 区间 [start, end) 是否完整落在单个连续窗口内
    pub fn covers_interval(&self, start: i32, end: i32) -> bool {
        self.windows.iter().any(|w| w.covers(start, end))
    }
}

// ==========================================
// ResolutionInput - 判定输入（均已按日期/星期几过滤）
// ==========================================
#[derive(Debug)]
pub struct ResolutionInput<'a> {
    /// 门店规则（当日星期几）
    pub agenda_rules: &'a [WorkingHourRule],
    /// 请求服务的专属规则（当日星期几; 未指定服务时为空）
    pub service_rules: &'a [ServiceScheduleRule],
    /// 请求服务在该 agenda 是否存在任意专属规则（任意星期几）
    pub service_restricted: bool,
    /// 覆盖当日的全部例外
    pub exceptions: &'a [BlockException],
    /// 请求的服务（None = agenda 级视角）
    pub service_id: Option<&'a str>,
    /// 无规则日期是否默认闭店
    pub default_closed_day: bool,
}

// ==========================================
// AvailabilityCore - 纯函数工具类
// ==========================================
pub struct AvailabilityCore;

impl AvailabilityCore {
    /// 按优先级合成当日开放窗口集
    ///
    /// # 返回
    /// - (WindowSet, Vec<String>): 窗口集 + 决策原因
    pub fn resolve_windows(input: &ResolutionInput<'_>) -> (WindowSet, Vec<String>) {
        let mut reasons = Vec::new();

        // === 步骤 1: 基础窗口集 ===
        let mut set = Self::base_windows(input, &mut reasons);

        // === 步骤 2/3: 减去封锁例外 ===
        for exc in input.exceptions {
            if exc.kind != ExceptionKind::Block {
                continue;
            }
            if !Self::block_applies(exc, input.service_id) {
                continue;
            }
            if let Some(window) = exc.effective_window() {
                set.subtract(window);
                reasons.push(format!(
                    "BLOCK: exception id={} [{}-{})",
                    exc.id,
                    crate::domain::schedule::format_minutes(window.start_min),
                    crate::domain::schedule::format_minutes(window.end_min)
                ));
            }
        }

        // === 步骤 4/5: 加回开放例外（开放胜过封锁） ===
        for exc in input.exceptions {
            if exc.kind != ExceptionKind::Enable {
                continue;
            }
            if !Self::enable_applies(exc, input.service_id) {
                continue;
            }
            if let Some(window) = exc.effective_window() {
                set.add(window);
                reasons.push(format!(
                    "ENABLE: exception id={} [{}-{})",
                    exc.id,
                    crate::domain::schedule::format_minutes(window.start_min),
                    crate::domain::schedule::format_minutes(window.end_min)
                ));
            }
        }

        if set.is_empty() {
            reasons.push("CLOSED: resulting window set empty".to_string());
        }

        (set, reasons)
    }

    /// 基础窗口集（步骤 1）
    fn base_windows(input: &ResolutionInput<'_>, reasons: &mut Vec<String>) -> WindowSet {
        // 服务受限: 只看服务专属规则, 不继承门店排班
        if input.service_id.is_some() && input.service_restricted {
            let windows: Vec<TimeWindow> =
                input.service_rules.iter().filter_map(|r| r.window()).collect();
            if windows.is_empty() {
                reasons.push("BASE: service restricted, no service rules today".to_string());
            } else {
                reasons.push(format!("BASE: {} service rule(s)", windows.len()));
            }
            return WindowSet::from_windows(windows);
        }

        let windows: Vec<TimeWindow> =
            input.agenda_rules.iter().filter_map(|r| r.window()).collect();
        if !windows.is_empty() {
            reasons.push(format!("BASE: {} agenda rule(s)", windows.len()));
            return WindowSet::from_windows(windows);
        }

        // 无任何规则: 按配置决定默认开/闭
        if input.default_closed_day {
            reasons.push("BASE: no rules, day closed by default".to_string());
            WindowSet::empty()
        } else {
            reasons.push("BASE: no rules, day open by default".to_string());
            WindowSet::from_windows(vec![TimeWindow::full_day()])
        }
    }

    /// 封锁例外是否适用
    ///
    /// # 规则
    /// - 无服务范围 → agenda 级封锁, 永远适用
    /// - 有服务范围 → 仅当请求了同一服务
    fn block_applies(exc: &BlockException, service_id: Option<&str>) -> bool {
        match (&exc.service_id, service_id) {
            (None, _) => true,
            (Some(scope), Some(requested)) => scope == requested,
            (Some(_), None) => false,
        }
    }

    /// 开放例外是否适用
    ///
    /// # 规则
    /// - 无服务范围 → 永远适用
    /// - 有服务范围且请求了同一服务 → 适用
    /// - 有服务范围但请求为 agenda 级视角 → 适用
    ///   （任意服务的人工开放都意味着该时段有可约内容）
    fn enable_applies(exc: &BlockException, service_id: Option<&str>) -> bool {
        match (&exc.service_id, service_id) {
            (None, _) => true,
            (Some(scope), Some(requested)) => scope == requested,
            (Some(_), None) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn agenda_rule(inicio: &str, fin: &str) -> WorkingHourRule {
        WorkingHourRule {
            id: 1,
            agenda_id: "A1".to_string(),
            dia_semana: 0,
            hora_inicio: inicio.to_string(),
            hora_fin: fin.to_string(),
        }
    }

    fn exception(
        id: i64,
        kind: ExceptionKind,
        es_todo_el_dia: bool,
        horas: Option<(&str, &str)>,
        service_id: Option<&str>,
    ) -> BlockException {
        BlockException {
            id,
            agenda_id: "A1".to_string(),
            kind,
            fecha_inicio: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            fecha_fin: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            hora_inicio: horas.map(|(i, _)| i.to_string()),
            hora_fin: horas.map(|(_, f)| f.to_string()),
            es_todo_el_dia,
            service_id: service_id.map(|s| s.to_string()),
            motivo: None,
        }
    }

    fn resolve(
        agenda_rules: &[WorkingHourRule],
        exceptions: &[BlockException],
        service_id: Option<&str>,
    ) -> WindowSet {
        let input = ResolutionInput {
            agenda_rules,
            service_rules: &[],
            service_restricted: false,
            exceptions,
            service_id,
            default_closed_day: true,
        };
        AvailabilityCore::resolve_windows(&input).0
    }

    #[test]
    fn test_window_set_merges_overlaps() {
        let set = WindowSet::from_windows(vec![
            TimeWindow::from_times("08:00", "12:00").unwrap(),
            TimeWindow::from_times("10:00", "14:00").unwrap(),
            TimeWindow::from_times("16:00", "18:00").unwrap(),
        ]);
        assert_eq!(
            set.windows(),
            &[
                TimeWindow::from_times("08:00", "14:00").unwrap(),
                TimeWindow::from_times("16:00", "18:00").unwrap(),
            ]
        );
    }

    #[test]
    fn test_window_set_merges_adjacent() {
        let set = WindowSet::from_windows(vec![
            TimeWindow::from_times("08:00", "12:00").unwrap(),
            TimeWindow::from_times("12:00", "14:00").unwrap(),
        ]);
        // 相邻合并为一段连续窗口: 跨 12:00 的预约合法
        assert!(set.covers_interval(690, 750));
    }

    #[test]
    fn test_subtract_splits_window() {
        let mut set = WindowSet::from_windows(vec![
            TimeWindow::from_times("08:00", "18:00").unwrap(),
        ]);
        set.subtract(TimeWindow::from_times("12:00", "13:00").unwrap());
        assert_eq!(
            set.windows(),
            &[
                TimeWindow::from_times("08:00", "12:00").unwrap(),
                TimeWindow::from_times("13:00", "18:00").unwrap(),
            ]
        );
        assert!(!set.contains(720));
        assert!(set.contains(780));
    }

    #[test]
    fn test_no_rules_day_closed() {
        let set = resolve(&[], &[], None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_no_rules_day_open_when_configured() {
        let input = ResolutionInput {
            agenda_rules: &[],
            service_rules: &[],
            service_restricted: false,
            exceptions: &[],
            service_id: None,
            default_closed_day: false,
        };
        let (set, _) = AvailabilityCore::resolve_windows(&input);
        assert!(set.contains(0));
        assert!(set.contains(1439));
    }

    #[test]
    fn test_whole_day_block_closes_everything() {
        let rules = [agenda_rule("08:00", "12:00")];
        let excs = [exception(1, ExceptionKind::Block, true, None, None)];
        let set = resolve(&rules, &excs, None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_enable_wins_over_block() {
        // 整天封锁 + 开放 09:00-10:00 → 仅该小时开放
        let rules = [agenda_rule("08:00", "12:00")];
        let excs = [
            exception(1, ExceptionKind::Block, true, None, None),
            exception(2, ExceptionKind::Enable, false, Some(("09:00", "10:00")), None),
        ];
        let set = resolve(&rules, &excs, None);
        assert_eq!(
            set.windows(),
            &[TimeWindow::from_times("09:00", "10:00").unwrap()]
        );
    }

    #[test]
    fn test_enable_opens_closed_day() {
        // 当日无任何规则, 开放例外直接开门
        let excs = [exception(1, ExceptionKind::Enable, false, Some(("14:00", "16:00")), None)];
        let set = resolve(&[], &excs, None);
        assert!(set.contains(870));
        assert!(!set.contains(840 - 1));
    }

    #[test]
    fn test_whole_day_enable_with_narrow_range() {
        let excs = [exception(
            1,
            ExceptionKind::Enable,
            true,
            Some(("09:00", "11:00")),
            None,
        )];
        let set = resolve(&[], &excs, None);
        assert_eq!(
            set.windows(),
            &[TimeWindow::from_times("09:00", "11:00").unwrap()]
        );
    }

    #[test]
    fn test_service_scoped_block_ignored_for_other_service() {
        let rules = [agenda_rule("08:00", "18:00")];
        let excs = [exception(
            1,
            ExceptionKind::Block,
            false,
            Some(("08:00", "18:00")),
            Some("S2"),
        )];

        // S1 不受 S2 范围的封锁影响
        let set = resolve(&rules, &excs, Some("S1"));
        assert!(set.contains(600));

        // S2 被封锁
        let set = resolve(&rules, &excs, Some("S2"));
        assert!(set.is_empty());

        // agenda 级视角不应用服务级封锁
        let set = resolve(&rules, &excs, None);
        assert!(set.contains(600));
    }

    #[test]
    fn test_service_restricted_ignores_agenda_hours() {
        let agenda_rules = [agenda_rule("08:00", "18:00")];
        let service_rules = [ServiceScheduleRule {
            id: 1,
            agenda_id: "A1".to_string(),
            service_id: "S1".to_string(),
            dia_semana: 1,
            hora_inicio: "14:00".to_string(),
            hora_fin: "16:00".to_string(),
        }];

        // 周二(受限服务有规则的那天): 仅 14:00-16:00
        let input = ResolutionInput {
            agenda_rules: &agenda_rules,
            service_rules: &service_rules,
            service_restricted: true,
            exceptions: &[],
            service_id: Some("S1"),
            default_closed_day: true,
        };
        let (set, _) = AvailabilityCore::resolve_windows(&input);
        assert_eq!(
            set.windows(),
            &[TimeWindow::from_times("14:00", "16:00").unwrap()]
        );

        // 周一(受限服务当日无规则): 即使门店开放也不可约
        let input = ResolutionInput {
            agenda_rules: &agenda_rules,
            service_rules: &[],
            service_restricted: true,
            exceptions: &[],
            service_id: Some("S1"),
            default_closed_day: true,
        };
        let (set, _) = AvailabilityCore::resolve_windows(&input);
        assert!(set.is_empty());
    }

    #[test]
    fn test_covers_interval_single_window_only() {
        let rules = [agenda_rule("08:00", "12:00"), agenda_rule("13:00", "18:00")];
        let set = resolve(&rules, &[], None);

        // 窗口内完整区间
        assert!(set.covers_interval(480, 720));
        // 跨越 12:00-13:00 缺口的区间不合法
        assert!(!set.covers_interval(700, 800));
    }
}
