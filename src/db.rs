// ==========================================
// 预约排程引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 引擎自有表 (citas / action_log) 的建表与索引
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒），与预约锁等待上限保持同级
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - 规则/目录表由外部数据层建库与迁移，引擎只读。
/// - 这里的版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 确保引擎自有表存在（citas / action_log / config_kv）
///
/// 说明：
/// - 规则与目录表 (agendas / global_services / horarios_* / bloqueos)
///   属于外部数据层, 引擎不负责其建表。
/// - 此函数幂等, 供组装根在启动时 best-effort 调用。
pub fn ensure_engine_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS citas (
            id TEXT PRIMARY KEY,
            agenda_id TEXT NOT NULL,
            service_id TEXT NOT NULL,
            fecha TEXT NOT NULL,
            hora TEXT NOT NULL,
            estado TEXT NOT NULL,
            cliente TEXT NOT NULL DEFAULT '{}',
            idempotency_key TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS action_log (
            id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            agenda_id TEXT,
            appointment_id TEXT,
            actor TEXT NOT NULL,
            detail TEXT,
            action_ts TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        -- 容量计数按 (agenda, fecha) 扫描, 并发下必须走索引
        CREATE INDEX IF NOT EXISTS idx_citas_agenda_fecha ON citas(agenda_id, fecha);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_citas_idempotency
            ON citas(idempotency_key) WHERE idempotency_key IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_action_ts ON action_log(action_ts);
        CREATE INDEX IF NOT EXISTS idx_action_type_ts ON action_log(action_type, action_ts);
        "#,
    )?;
    Ok(())
}
