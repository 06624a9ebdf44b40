// ==========================================
// 预约排程引擎 - 应用层
// ==========================================
// 职责: 组装根与默认路径辅助
// ==========================================

pub mod state;

pub use state::{get_default_db_path, AppState};
