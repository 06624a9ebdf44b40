// ==========================================
// 预约排程引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: agenda/{id} 优先, 回退 global, 再回退内置默认值
// ==========================================

use crate::config::booking_config_trait::BookingConfigReader;
use crate::domain::schedule::MINUTES_PER_DAY;
use crate::domain::types::CapacityPolicy;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 容量桶粒度默认值（分钟）
pub const DEFAULT_BUCKET_GRANULARITY_MIN: i32 = 60;

/// 预约锁等待上限默认值（毫秒）
pub const DEFAULT_BOOKING_LOCK_TIMEOUT_MS: u64 = 5_000;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(
        conn: Arc<Mutex<Connection>>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)
                .map_err(|e| format!("PRAGMA 配置失败: {}", e))?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值
    ///
    /// # 参数
    /// - scope_id: 作用域（"global" 或 "agenda/{id}"）
    /// - key: 配置键
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(
        &self,
        scope_id: &str,
        key: &str,
    ) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope_id, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 按 agenda 作用域读取, 回退 global 作用域
    fn get_scoped_value(
        &self,
        agenda_id: &str,
        key: &str,
    ) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
        let agenda_scope = format!("agenda/{}", agenda_id);
        if let Some(v) = self.get_config_value(&agenda_scope, key)? {
            return Ok(Some(v));
        }
        self.get_config_value("global", key)
    }

    /// 写入配置值（INSERT OR REPLACE, 幂等）
    pub fn set_config_value(
        &self,
        scope_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)",
            params![scope_id, key, value],
        )
        .map_err(|e| format!("配置写入失败: {}", e))?;

        Ok(())
    }

    // ==========================================
    // 便捷写入接口（agenda 作用域）
    // ==========================================

    /// 设置某 agenda 的容量策略
    pub fn set_capacity_policy(
        &self,
        agenda_id: &str,
        policy: CapacityPolicy,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_config_value(
            &format!("agenda/{}", agenda_id),
            "capacity_policy",
            policy.as_str(),
        )
    }

    /// 设置某 agenda 的容量桶粒度（分钟）
    pub fn set_bucket_granularity_minutes(
        &self,
        agenda_id: &str,
        minutes: i32,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_config_value(
            &format!("agenda/{}", agenda_id),
            "bucket_granularity_minutes",
            &minutes.to_string(),
        )
    }

    /// 设置某 agenda 无规则日期的默认开闭策略
    pub fn set_default_closed_day(
        &self,
        agenda_id: &str,
        closed: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_config_value(
            &format!("agenda/{}", agenda_id),
            "default_closed_day",
            if closed { "true" } else { "false" },
        )
    }

    /// 设置预约锁等待上限（global 作用域）
    pub fn set_booking_lock_timeout_ms(
        &self,
        timeout_ms: u64,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_config_value("global", "booking_lock_timeout_ms", &timeout_ms.to_string())
    }
}

// ==========================================
// BookingConfigReader 实现
// ==========================================
#[async_trait]
impl BookingConfigReader for ConfigManager {
    async fn get_capacity_policy(
        &self,
        agenda_id: &str,
    ) -> Result<CapacityPolicy, Box<dyn Error + Send + Sync>> {
        match self.get_scoped_value(agenda_id, "capacity_policy")? {
            Some(raw) => match CapacityPolicy::parse(&raw) {
                Some(policy) => Ok(policy),
                None => {
                    tracing::warn!(
                        "capacity_policy 配置值非法, 回退 AGENDA: agenda_id={}, value={}",
                        agenda_id,
                        raw
                    );
                    Ok(CapacityPolicy::Agenda)
                }
            },
            None => Ok(CapacityPolicy::Agenda),
        }
    }

    async fn get_bucket_granularity_minutes(
        &self,
        agenda_id: &str,
    ) -> Result<i32, Box<dyn Error + Send + Sync>> {
        let raw = self.get_scoped_value(agenda_id, "bucket_granularity_minutes")?;
        let minutes = raw
            .and_then(|v| v.trim().parse::<i32>().ok())
            .unwrap_or(DEFAULT_BUCKET_GRANULARITY_MIN);

        // 粒度必须整除一天, 否则桶边界漂移
        if minutes <= 0 || MINUTES_PER_DAY % minutes != 0 {
            tracing::warn!(
                "bucket_granularity_minutes 非法, 回退默认值: agenda_id={}, value={}",
                agenda_id,
                minutes
            );
            return Ok(DEFAULT_BUCKET_GRANULARITY_MIN);
        }

        Ok(minutes)
    }

    async fn get_default_closed_day(
        &self,
        agenda_id: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        match self.get_scoped_value(agenda_id, "default_closed_day")? {
            Some(raw) => Ok(raw.trim().eq_ignore_ascii_case("true") || raw.trim() == "1"),
            None => Ok(true),
        }
    }

    async fn get_booking_lock_timeout_ms(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
        let raw = self.get_config_value("global", "booking_lock_timeout_ms")?;
        Ok(raw
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_BOOKING_LOCK_TIMEOUT_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_id, key)
            );
            "#,
        )
        .unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_without_rows() {
        let config = setup();

        assert_eq!(
            config.get_capacity_policy("A1").await.unwrap(),
            CapacityPolicy::Agenda
        );
        assert_eq!(config.get_bucket_granularity_minutes("A1").await.unwrap(), 60);
        assert!(config.get_default_closed_day("A1").await.unwrap());
        assert_eq!(config.get_booking_lock_timeout_ms().await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_agenda_scope_overrides_global() {
        let config = setup();

        config
            .set_config_value("global", "capacity_policy", "AGENDA")
            .unwrap();
        config.set_capacity_policy("A1", CapacityPolicy::Service).unwrap();

        assert_eq!(
            config.get_capacity_policy("A1").await.unwrap(),
            CapacityPolicy::Service
        );
        // 未覆写的 agenda 读到 global 值
        assert_eq!(
            config.get_capacity_policy("A2").await.unwrap(),
            CapacityPolicy::Agenda
        );
    }

    #[tokio::test]
    async fn test_invalid_granularity_falls_back() {
        let config = setup();

        config.set_bucket_granularity_minutes("A1", 7).unwrap();
        assert_eq!(config.get_bucket_granularity_minutes("A1").await.unwrap(), 60);

        config.set_bucket_granularity_minutes("A1", 30).unwrap();
        assert_eq!(config.get_bucket_granularity_minutes("A1").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_default_closed_day_override() {
        let config = setup();

        config.set_default_closed_day("A1", false).unwrap();
        assert!(!config.get_default_closed_day("A1").await.unwrap());
    }
}
