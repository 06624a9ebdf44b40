// ==========================================
// 预约排程引擎 - 引擎层
// ==========================================
// 职责: 实现可用性判定、容量追踪、预约事务、变更通知
// 红线: Engine 不拼 SQL, 所有拒绝必须输出 reason
// ==========================================

pub mod availability;
pub mod availability_core;
pub mod booking;
pub mod capacity_tracker;
pub mod events;

// 重导出核心引擎
pub use availability::{AvailabilityResolver, ResolvedDay};
pub use availability_core::{AvailabilityCore, ResolutionInput, WindowSet};
pub use booking::{BookingDecision, BookingEngine, EditDecision, RejectionReason};
pub use capacity_tracker::{bucket_of, touched_buckets, CapacityTracker};
pub use events::{
    AgendaChangeEvent, AgendaEventKind, AgendaEventPublisher, ChangeCallback, NoOpEventPublisher,
    OptionalEventPublisher, SubscriptionHub,
};
