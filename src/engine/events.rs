// ==========================================
// 预约排程引擎 - 引擎层事件发布
// ==========================================
// 职责: 定义日程变更事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，投递通道（推送/轮询/消息队列）由外部实现
// 红线: 事件投递是尽力而为的缓存失效提示, 预约正确性绝不依赖投递
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 日程变更事件类型
// ==========================================

/// 日程变更事件触发类型
///
/// Engine 层定义的事件类型，用于通知下游视图刷新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgendaEventKind {
    /// 新预约提交
    AppointmentBooked,
    /// 预约取消
    AppointmentCancelled,
    /// 预约改期
    AppointmentRescheduled,
    /// 封锁/开放例外变更
    ExceptionChanged,
    /// 手动触发
    ManualTrigger,
}

impl AgendaEventKind {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            AgendaEventKind::AppointmentBooked => "AppointmentBooked",
            AgendaEventKind::AppointmentCancelled => "AppointmentCancelled",
            AgendaEventKind::AppointmentRescheduled => "AppointmentRescheduled",
            AgendaEventKind::ExceptionChanged => "ExceptionChanged",
            AgendaEventKind::ManualTrigger => "ManualTrigger",
        }
    }
}

/// 日程变更事件
///
/// Engine 层发布的事实: 某 agenda 的排程发生了变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaChangeEvent {
    /// 日程 ID
    pub agenda_id: String,
    /// 事件类型
    pub kind: AgendaEventKind,
    /// 受影响的日期（None 表示不确定/全部）
    pub fecha: Option<NaiveDate>,
    /// 事件来源描述
    pub source: Option<String>,
}

impl AgendaChangeEvent {
    /// 创建事件
    pub fn new(
        agenda_id: impl Into<String>,
        kind: AgendaEventKind,
        fecha: Option<NaiveDate>,
        source: Option<String>,
    ) -> Self {
        Self {
            agenda_id: agenda_id.into(),
            kind,
            fecha,
            source,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 日程变更事件发布者 Trait
///
/// Engine 层定义，投递适配器在外部实现
///
/// # 实现说明
/// - 发布失败只记录日志, 不回传给预约调用方
/// - 发布必须在预约锁与事务之外调用, 避免订阅方延迟拖慢预约
pub trait AgendaEventPublisher: Send + Sync {
    /// 发布日程变更事件
    fn publish(&self, event: AgendaChangeEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl AgendaEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: AgendaChangeEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - agenda_id={}, kind={}",
            event.agenda_id,
            event.kind.as_str()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn AgendaEventPublisher>> 的使用
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn AgendaEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn AgendaEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）; 失败只记警告
    pub fn publish_best_effort(&self, event: AgendaChangeEvent) {
        let Some(publisher) = &self.inner else {
            tracing::debug!(
                "OptionalEventPublisher: 未配置发布者，跳过事件 - agenda_id={}, kind={}",
                event.agenda_id,
                event.kind.as_str()
            );
            return;
        };

        let agenda_id = event.agenda_id.clone();
        let kind = event.kind.clone();
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(
                "事件发布失败(忽略): agenda_id={}, kind={}, err={}",
                agenda_id,
                kind.as_str(),
                e
            );
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

// ==========================================
// SubscriptionHub - 进程内订阅分发
// ==========================================

/// 订阅回调
pub type ChangeCallback = Arc<dyn Fn(&AgendaChangeEvent) + Send + Sync>;

/// 进程内订阅分发器
///
/// 实现 `on_change(agenda_id, callback)` 订阅面:
/// 按 agenda 注册回调, 发布时逐一通知。跨进程投递
/// (WebSocket/推送) 由外部适配器实现同一 trait。
#[derive(Default)]
pub struct SubscriptionHub {
    subscribers: Mutex<HashMap<String, Vec<ChangeCallback>>>,
}

impl SubscriptionHub {
    /// 创建空的分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册某 agenda 的变更回调
    pub fn subscribe(&self, agenda_id: &str, callback: ChangeCallback) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers
            .entry(agenda_id.to_string())
            .or_default()
            .push(callback);
    }

    /// 某 agenda 当前的订阅数
    pub fn subscriber_count(&self, agenda_id: &str) -> usize {
        let subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.get(agenda_id).map_or(0, |v| v.len())
    }
}

impl AgendaEventPublisher for SubscriptionHub {
    fn publish(&self, event: AgendaChangeEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let callbacks: Vec<ChangeCallback> = {
            let subscribers = match self.subscribers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            subscribers
                .get(&event.agenda_id)
                .cloned()
                .unwrap_or_default()
        };

        tracing::debug!(
            "SubscriptionHub: 分发事件 - agenda_id={}, kind={}, subscribers={}",
            event.agenda_id,
            event.kind.as_str(),
            callbacks.len()
        );

        for callback in callbacks {
            callback(&event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_kind_as_str() {
        assert_eq!(
            AgendaEventKind::AppointmentBooked.as_str(),
            "AppointmentBooked"
        );
        assert_eq!(AgendaEventKind::ExceptionChanged.as_str(), "ExceptionChanged");
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let event = AgendaChangeEvent::new(
            "A1",
            AgendaEventKind::ManualTrigger,
            None,
            None,
        );

        assert!(publisher.publish(event).is_ok());
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());

        // 未配置时静默跳过
        publisher.publish_best_effort(AgendaChangeEvent::new(
            "A1",
            AgendaEventKind::ManualTrigger,
            None,
            None,
        ));
    }

    #[test]
    fn test_subscription_hub_dispatch() {
        let hub = SubscriptionHub::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        hub.subscribe(
            "A1",
            Arc::new(move |event| {
                assert_eq!(event.agenda_id, "A1");
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(hub.subscriber_count("A1"), 1);

        // A1 订阅者收到 A1 事件
        hub.publish(AgendaChangeEvent::new(
            "A1",
            AgendaEventKind::AppointmentBooked,
            None,
            Some("test".to_string()),
        ))
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // 其他 agenda 的事件不会派发给 A1 订阅者
        hub.publish(AgendaChangeEvent::new(
            "A2",
            AgendaEventKind::AppointmentBooked,
            None,
            None,
        ))
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
