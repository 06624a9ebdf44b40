// ==========================================
// 预约排程引擎 - 排班规则仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: horarios_atencion / horarios_servicios / bloqueos 的数据访问
// 说明: 规则表归外部数据层所有; 例外 (bloqueos) 的增删经由
//       ScheduleApi 走本仓储, 以便变更后统一发布事件
// ==========================================

use crate::domain::schedule::{BlockException, ServiceScheduleRule, WorkingHourRule};
use crate::domain::types::ExceptionKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ScheduleRuleRepository - 排班规则仓储
// ==========================================
pub struct ScheduleRuleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRuleRepository {
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

    // ==========================================
    // 门店周期排班 (horarios_atencion)
    // ==========================================

    /// 查询日程在某星期几的全部排班规则
    pub fn find_working_hours(
        &self,
        agenda_id: &str,
        dia_semana: i32,
    ) -> RepositoryResult<Vec<WorkingHourRule>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, agenda_id, dia_semana, hora_inicio, hora_fin
            FROM horarios_atencion
            WHERE agenda_id = ?1 AND dia_semana = ?2
            ORDER BY hora_inicio
            "#,
        )?;

        let rules = stmt
            .query_map(params![agenda_id, dia_semana], |row| {
                Ok(WorkingHourRule {
                    id: row.get(0)?,
                    agenda_id: row.get(1)?,
                    dia_semana: row.get(2)?,
                    hora_inicio: row.get(3)?,
                    hora_fin: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<WorkingHourRule>>>()?;

        Ok(rules)
    }

    /// 插入一条门店排班规则（协作方/测试用）
    pub fn insert_working_hour(
        &self,
        agenda_id: &str,
        dia_semana: i32,
        hora_inicio: &str,
        hora_fin: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO horarios_atencion (agenda_id, dia_semana, hora_inicio, hora_fin)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![agenda_id, dia_semana, hora_inicio, hora_fin],
        )?;

        Ok(conn.last_insert_rowid())
    }

    // ==========================================
    // 服务专属排班 (horarios_servicios)
    // ==========================================

    /// 查询某服务在某星期几的专属排班规则
    pub fn find_service_schedule(
        &self,
        agenda_id: &str,
        service_id: &str,
        dia_semana: i32,
    ) -> RepositoryResult<Vec<ServiceScheduleRule>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, agenda_id, service_id, dia_semana, hora_inicio, hora_fin
            FROM horarios_servicios
            WHERE agenda_id = ?1 AND service_id = ?2 AND dia_semana = ?3
            ORDER BY hora_inicio
            "#,
        )?;

        let rules = stmt
            .query_map(params![agenda_id, service_id, dia_semana], |row| {
                Ok(ServiceScheduleRule {
                    id: row.get(0)?,
                    agenda_id: row.get(1)?,
                    service_id: row.get(2)?,
                    dia_semana: row.get(3)?,
                    hora_inicio: row.get(4)?,
                    hora_fin: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<ServiceScheduleRule>>>()?;

        Ok(rules)
    }

    /// 某服务在该日程下是否存在任意专属排班规则（任意星期几）
    ///
    /// # 说明
    /// 存在任意一条即视为“受限服务”: 只在自身规则内可约
    pub fn has_service_schedule(
        &self,
        agenda_id: &str,
        service_id: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM horarios_servicios
            WHERE agenda_id = ?1 AND service_id = ?2
            "#,
            params![agenda_id, service_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// 插入一条服务专属排班规则（协作方/测试用）
    pub fn insert_service_schedule(
        &self,
        agenda_id: &str,
        service_id: &str,
        dia_semana: i32,
        hora_inicio: &str,
        hora_fin: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO horarios_servicios (agenda_id, service_id, dia_semana, hora_inicio, hora_fin)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![agenda_id, service_id, dia_semana, hora_inicio, hora_fin],
        )?;

        Ok(conn.last_insert_rowid())
    }

    // ==========================================
    // 封锁/开放例外 (bloqueos)
    // ==========================================

    /// 查询覆盖指定日期的全部例外（封锁与开放）
    pub fn find_exceptions_on(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
    ) -> RepositoryResult<Vec<BlockException>> {
        let conn = self.get_conn()?;
        let fecha_str = fecha.format("%Y-%m-%d").to_string();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, agenda_id, tipo, fecha_inicio, fecha_fin,
                   hora_inicio, hora_fin, es_todo_el_dia, service_id, motivo
            FROM bloqueos
            WHERE agenda_id = ?1
              AND fecha_inicio <= ?2 AND fecha_fin >= ?2
            ORDER BY id
            "#,
        )?;

        let exceptions = stmt
            .query_map(params![agenda_id, fecha_str], row_to_exception)?
            .collect::<SqliteResult<Vec<BlockException>>>()?;

        Ok(exceptions)
    }

    /// 查询日程的全部例外
    pub fn list_exceptions(&self, agenda_id: &str) -> RepositoryResult<Vec<BlockException>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, agenda_id, tipo, fecha_inicio, fecha_fin,
                   hora_inicio, hora_fin, es_todo_el_dia, service_id, motivo
            FROM bloqueos
            WHERE agenda_id = ?1
            ORDER BY fecha_inicio, id
            "#,
        )?;

        let exceptions = stmt
            .query_map(params![agenda_id], row_to_exception)?
            .collect::<SqliteResult<Vec<BlockException>>>()?;

        Ok(exceptions)
    }

    /// 插入一条例外, 返回其 ID
    #[allow(clippy::too_many_arguments)]
    pub fn insert_exception(
        &self,
        agenda_id: &str,
        kind: ExceptionKind,
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
        hora_inicio: Option<&str>,
        hora_fin: Option<&str>,
        es_todo_el_dia: bool,
        service_id: Option<&str>,
        motivo: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO bloqueos (
                agenda_id, tipo, fecha_inicio, fecha_fin,
                hora_inicio, hora_fin, es_todo_el_dia, service_id, motivo
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                agenda_id,
                kind.as_i64(),
                fecha_inicio.format("%Y-%m-%d").to_string(),
                fecha_fin.format("%Y-%m-%d").to_string(),
                hora_inicio,
                hora_fin,
                es_todo_el_dia as i64,
                service_id,
                motivo,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按 ID 查询例外
    pub fn find_exception_by_id(
        &self,
        exception_id: i64,
    ) -> RepositoryResult<Option<BlockException>> {
        let conn = self.get_conn()?;

        let exception = conn
            .query_row(
                r#"
                SELECT id, agenda_id, tipo, fecha_inicio, fecha_fin,
                       hora_inicio, hora_fin, es_todo_el_dia, service_id, motivo
                FROM bloqueos
                WHERE id = ?1
                "#,
                params![exception_id],
                row_to_exception,
            )
            .optional()?;

        Ok(exception)
    }

    /// 删除一条例外
    ///
    /// # 返回
    /// - Ok(true): 删除成功
    /// - Ok(false): 例外不存在
    pub fn delete_exception(&self, exception_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "DELETE FROM bloqueos WHERE id = ?1",
            params![exception_id],
        )?;

        Ok(affected > 0)
    }
}

/// 行映射: bloqueos → BlockException
fn row_to_exception(row: &Row<'_>) -> SqliteResult<BlockException> {
    let tipo: i64 = row.get(2)?;
    let kind = ExceptionKind::from_i64(tipo).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("tipo 值非法: {}", tipo).into(),
        )
    })?;

    let fecha_inicio: String = row.get(3)?;
    let fecha_fin: String = row.get(4)?;
    let es_todo_el_dia: i64 = row.get(7)?;

    Ok(BlockException {
        id: row.get(0)?,
        agenda_id: row.get(1)?,
        kind,
        fecha_inicio: parse_fecha(3, &fecha_inicio)?,
        fecha_fin: parse_fecha(4, &fecha_fin)?,
        hora_inicio: row.get(5)?,
        hora_fin: row.get(6)?,
        es_todo_el_dia: es_todo_el_dia != 0,
        service_id: row.get(8)?,
        motivo: row.get(9)?,
    })
}

/// 日期列解析（格式 YYYY-MM-DD）
fn parse_fecha(idx: usize, s: &str) -> SqliteResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("日期格式非法 ({}): {}", s, e).into(),
        )
    })
}
