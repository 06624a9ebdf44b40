// ==========================================
// 预约排程引擎 - 操作日志仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// ActionLogRepository - 操作日志仓储
// ==========================================
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条操作日志
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO action_log (
                id, action_type, agenda_id, appointment_id, actor, detail, action_ts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                log.id,
                log.action_type.as_str(),
                log.agenda_id,
                log.appointment_id,
                log.actor,
                log.detail,
                log.action_ts.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// 查询日程最近的操作日志
    pub fn find_recent_by_agenda(
        &self,
        agenda_id: &str,
        limit: i64,
    ) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, action_type, agenda_id, appointment_id, actor, detail, action_ts
            FROM action_log
            WHERE agenda_id = ?1
            ORDER BY action_ts DESC
            LIMIT ?2
            "#,
        )?;

        let logs = stmt
            .query_map(params![agenda_id, limit], |row| {
                let action_type_str: String = row.get(1)?;
                let action_ts_str: String = row.get(6)?;

                let action_type = parse_action_type(&action_type_str).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        format!("action_type 非法: {}", action_type_str).into(),
                    )
                })?;
                let action_ts: DateTime<Utc> = DateTime::parse_from_rfc3339(&action_ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            6,
                            rusqlite::types::Type::Text,
                            format!("时间戳非法 ({}): {}", action_ts_str, e).into(),
                        )
                    })?;

                Ok(ActionLog {
                    id: row.get(0)?,
                    action_type,
                    agenda_id: row.get(2)?,
                    appointment_id: row.get(3)?,
                    actor: row.get(4)?,
                    detail: row.get(5)?,
                    action_ts,
                })
            })?
            .collect::<SqliteResult<Vec<ActionLog>>>()?;

        Ok(logs)
    }
}

/// 从数据库字符串解析操作类型
fn parse_action_type(s: &str) -> Option<ActionType> {
    match s {
        "BOOK_APPOINTMENT" => Some(ActionType::BookAppointment),
        "CANCEL_APPOINTMENT" => Some(ActionType::CancelAppointment),
        "RESCHEDULE_APPOINTMENT" => Some(ActionType::RescheduleAppointment),
        "ADD_EXCEPTION" => Some(ActionType::AddException),
        "REMOVE_EXCEPTION" => Some(ActionType::RemoveException),
        _ => None,
    }
}
