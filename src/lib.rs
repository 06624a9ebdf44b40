// ==========================================
// 预约排程 CRM - 可用性与预约引擎核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 多坐席预约业务的可用性判定与并发安全预约内核
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 可用性/容量/预约事务
pub mod engine;

// 配置层 - 引擎配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装根
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AppointmentStatus, CapacityPolicy, ExceptionKind};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Agenda, Appointment, BlockException, BookingRequest, BucketUsage,
    CapacityBucket, Service, ServiceScheduleRule, TimeWindow, WorkingHourRule,
};

// 引擎
pub use engine::{
    AgendaChangeEvent, AgendaEventKind, AgendaEventPublisher, AvailabilityResolver, BookingEngine,
    CapacityTracker, NoOpEventPublisher, OptionalEventPublisher, SubscriptionHub,
};

// API
pub use api::{BookingApi, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "预约排程引擎";
