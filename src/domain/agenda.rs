// ==========================================
// 预约排程引擎 - 日程与服务领域模型
// ==========================================
// 职责: 定义 Agenda（业务单元日程）与 Service（服务目录项）
// 红线: 引擎只读取这两类记录, 不创建、不删除
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Agenda - 业务单元日程 (agendas)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agenda {
    pub id: String,
    pub name: String,
    /// 每个容量桶的默认并发上限（≥1）
    pub slots_per_hour: i32,
}

// ==========================================
// Service - 服务目录项 (global_services)
// ==========================================
// 说明: 服务目录跨 agenda 共享; 定价绑定 (agenda_services)
//       不属于引擎核心, 引擎只关心时长与并发
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub nombre: String,
    /// 服务时长（分钟, >0）
    pub duracion_minutos: i32,
    /// 服务自身的并发容量（≥1, 默认 1）
    pub concurrency: i32,
}
